// Carton labels: form model, face geometry and the label HTTP handlers.

pub mod geometry;
pub mod handlers;
pub mod models;

pub use geometry::{calc_label_sizes, FooterKind, LabelKind, LabelSize, Viewport};
pub use models::{BoxDimensions, LabelValues};
