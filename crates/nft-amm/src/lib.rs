pub mod arguments;
pub mod hooks;
pub mod render;
mod run;
pub mod settings;

pub use run::start;
