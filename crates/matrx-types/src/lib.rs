pub mod documents;
pub mod engine;
pub mod logs;
pub mod scraper;
pub mod tool;

pub use documents::*;
pub use engine::*;
pub use logs::*;
pub use scraper::*;
pub use tool::*;
