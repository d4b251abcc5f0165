// Application Layer - Use Cases

pub mod capture;
pub mod constants;
pub mod executor;
pub mod instrumentation;
pub mod notebook;
pub mod pipeline;
pub mod reconciler;

// Re-exports
pub use capture::CaptureManifest;
pub use executor::UnitExecutor;
pub use instrumentation::{CaptureFragment, FigureNaming, ScriptDriver};
pub use notebook::NotebookDocument;
pub use pipeline::{Pipeline, PipelineObserver, SilentObserver};
pub use reconciler::{free_destination, FileReconciler, ReconcileReport};
