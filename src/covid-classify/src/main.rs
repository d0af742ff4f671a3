use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use covid_serve::{ModelOps, SavedModel, XrayClassifier};

extern crate serde_json;

use log::info;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "covid-classify",
    about = "CLI app to classify chest X-ray images for COVID-19"
)]
struct CmdArgs {
    #[structopt(parse(from_os_str), help = "Export directory of TensorFlow SavedModel")]
    export_dir: PathBuf,

    #[structopt(
        parse(from_os_str),
        required = true,
        help = "PNG or JPEG images to classify"
    )]
    images: Vec<PathBuf>,

    #[structopt(long, help = "Graph operation fed with the image tensor")]
    input_op: Option<String>,

    #[structopt(long, help = "Graph operation holding the model output")]
    output_op: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let defaults = ModelOps::default();
    let ops = ModelOps {
        input: args.input_op.unwrap_or(defaults.input),
        output: args.output_op.unwrap_or(defaults.output),
    };

    let model = SavedModel::load(&args.export_dir, ops)?;
    let classifier = XrayClassifier::new(Arc::new(model));

    for path in &args.images {
        let classification = classifier.classify_file(path)?;

        info!(
            "{}: {}",
            path.display(),
            serde_json::to_string(&classification)?
        );
    }

    Ok(())
}
