pub mod text;

pub use text::{display_width, graph_lines, truncate_to_width, TextRenderer};
