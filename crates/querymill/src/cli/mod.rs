pub mod rows;
pub mod status;
pub mod submit;
pub mod validate;
