pub mod killers;
pub mod output;
pub mod results;
pub mod runner;
