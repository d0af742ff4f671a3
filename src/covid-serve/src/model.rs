use std::path::Path;

use log::info;
use tensorflow::{Graph, SavedModelBundle, Session, SessionOptions, SessionRunArgs, Tensor};

use crate::config::{DEFAULT_INPUT_OP, DEFAULT_OUTPUT_OP};
use crate::error::{Error, Result};
use crate::preprocess::InputTensor;
use crate::timer::Timer;

/// A loaded network exposing one forward pass.
///
/// Handles are shared read-only between requests, so implementations must
/// be callable from several threads at once.
pub trait Model: Send + Sync {
    /// Run the network on `input` and return the flattened output tensor
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>>;
}

/// Names of the graph operations fed and fetched on each run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelOps {
    pub input: String,
    pub output: String,
}

impl Default for ModelOps {
    fn default() -> Self {
        ModelOps {
            input: DEFAULT_INPUT_OP.to_owned(),
            output: DEFAULT_OUTPUT_OP.to_owned(),
        }
    }
}

/// TensorFlow SavedModel exported with the `serve` tag
pub struct SavedModel {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,

    ops: ModelOps,
}

impl SavedModel {
    pub fn load(export_dir: &Path, ops: ModelOps) -> Result<Self> {
        if !export_dir.exists() {
            return Err(Error::ModelNotFound(export_dir.to_path_buf()));
        }

        let mut t = Timer::new_start("Loading session");

        let mut graph = Graph::new();
        let session =
            SavedModelBundle::load(&SessionOptions::new(), &["serve"], &mut graph, export_dir)?
                .session;

        // Surface wrong operation names at startup rather than on the first request.
        graph.operation_by_name_required(&ops.input)?;
        graph.operation_by_name_required(&ops.output)?;

        t.stop();

        info!(
            "Loaded model from {} (input '{}', output '{}')",
            export_dir.display(),
            ops.input,
            ops.output
        );

        Ok(SavedModel {
            graph,
            session,
            ops,
        })
    }
}

impl Model for SavedModel {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let tensor = Tensor::new(&input.shape()).with_values(input.values())?;

        let mut args = SessionRunArgs::new();

        args.add_feed(
            &self.graph.operation_by_name_required(&self.ops.input)?,
            0,
            &tensor,
        );

        let token =
            args.request_fetch(&self.graph.operation_by_name_required(&self.ops.output)?, 0);

        self.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(token)?;

        Ok(output.to_vec())
    }
}

/// Load the model at `path` with the default operation names.
pub fn load_model(path: &Path) -> Result<SavedModel> {
    SavedModel::load(path, ModelOps::default())
}
