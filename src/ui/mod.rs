//! Terminal output for the `symgraph` binary.

pub mod icons;
pub mod output;
pub mod progress;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, info, section, success, summary_row, warn};
pub use progress::Spinner;
pub use theme::theme;
