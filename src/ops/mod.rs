pub mod brush;
pub mod scripting;
pub mod text;
pub mod transform;
