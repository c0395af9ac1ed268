pub mod chart_json;

pub use chart_json::{load_chart, parse_chart};
