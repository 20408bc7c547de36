pub mod deps;
pub mod error;
pub mod include;
pub mod lexer;
pub mod linker;
pub mod ogsfx;
pub mod parser;
pub mod property;
pub mod shader;
