use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use covid_detector::{handle, AppState};
use covid_serve::config;
use covid_serve::{ModelOps, SavedModel, XrayClassifier};

use log::{error, info};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "covid-detector",
    about = "HTTP service classifying chest X-rays for COVID-19"
)]
struct CmdArgs {
    #[structopt(long, help = "Address to bind to [default: 0.0.0.0]")]
    host: Option<IpAddr>,

    #[structopt(long, help = "Port to listen on [default: 5000]")]
    port: Option<u16>,

    #[structopt(
        long,
        parse(from_os_str),
        help = "Export directory of the TensorFlow SavedModel [default: modelo_covid]"
    )]
    model: Option<PathBuf>,

    #[structopt(
        long,
        parse(from_os_str),
        help = "Directory uploads are staged in while being classified [default: uploads]"
    )]
    upload_dir: Option<PathBuf>,

    #[structopt(long, help = "Graph operation fed with the image tensor")]
    input_op: Option<String>,

    #[structopt(long, help = "Graph operation holding the model output")]
    output_op: Option<String>,
}

impl CmdArgs {
    fn model_ops(&self) -> ModelOps {
        let defaults = ModelOps::default();

        ModelOps {
            input: self.input_op.clone().unwrap_or(defaults.input),
            output: self.output_op.clone().unwrap_or(defaults.output),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for ctrl-c: {}", e);
    }

    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let model_path = args
        .model
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::MODEL_PATH));
    let upload_dir = args
        .upload_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::UPLOAD_FOLDER));

    std::fs::create_dir_all(&upload_dir)?;

    // Fail before binding if the model cannot be loaded.
    let model = SavedModel::load(&model_path, args.model_ops()).map_err(|e| {
        error!("Could not load model: {}", e);
        e
    })?;
    let classifier = XrayClassifier::new(Arc::new(model));

    let state = Arc::new(AppState::new(classifier, upload_dir));

    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let state = Arc::clone(&state);

        let service = service_fn(move |req| handle(req, state.clone()));

        async move { Ok::<_, Infallible>(service) }
    });

    let addr = SocketAddr::new(
        args.host.unwrap_or(config::DEFAULT_HOST),
        args.port.unwrap_or(config::DEFAULT_PORT),
    );

    let server = Server::try_bind(&addr)?.serve(make_service);
    info!("Listening on http://{}", addr);

    server.with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}
