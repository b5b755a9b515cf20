pub mod commands;
pub mod frame;
pub mod lexer;
pub mod parser;
pub mod tags;
