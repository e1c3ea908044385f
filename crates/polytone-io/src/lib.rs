//! File boundary for tone sessions: decode, encode and curve plots.

pub mod color;
pub mod load;
pub mod plot;
pub mod save;

pub use load::{LoadOptions, load_image};
pub use plot::{render_curve_plot, save_curve_plot};
pub use save::{save_image, to_dynamic_image};
