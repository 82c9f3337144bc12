pub mod chrome;
pub mod header;
pub mod menu;
pub mod output;
pub mod prompt;
pub mod status_bar;

pub const SPINNER: [&str; 6] = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"];
