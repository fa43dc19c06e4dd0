// Label layout: text metrics, the label layout model, bucket typography and the auto-fit engine.
// Fitting is CPU-bound; async callers run it inside tokio::task::spawn_blocking.

pub mod autofit;
pub mod buckets;
pub mod font_metrics;
pub mod label_surface;
pub mod surface;
pub mod text;

pub use autofit::{fit_at_size, fit_each, fit_each_with, fit_surface, CancelToken, FitOutcome, FitParams, FitState};
pub use buckets::{BucketConfigError, BucketTable, BucketTypography};
pub use label_surface::{LabelContent, LabelSurface, TextRun, Typography};
pub use surface::{LayoutSurface, Size, WrapMode};
