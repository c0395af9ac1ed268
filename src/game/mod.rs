pub mod cache;
pub mod chart;
pub mod error;
pub mod judge_line;
pub mod note;
pub mod parsing;
pub mod speed;
pub mod timeline;
