pub mod html;
pub mod json;
pub mod numeric;

pub use html::HtmlCharacterParser;
