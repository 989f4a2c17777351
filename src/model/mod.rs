pub mod groove;
pub mod harmony;
pub mod note;
pub mod pattern;
pub mod song;
pub mod track;
