pub mod content;
pub mod document;
pub mod fonts;
pub mod resources;
pub mod template;
