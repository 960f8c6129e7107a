// Parsing and formatting helpers shared by the dashboard and CLI

pub mod date;
pub mod duration;
pub mod glyph;
pub mod units;
