pub mod driver;
pub mod manager;
pub mod selectors;

pub use driver::PageDriver;
pub use manager::{BrowserManager, BrowserOptions};
