pub mod ast;
pub mod common;
pub mod compile;
pub mod run;
