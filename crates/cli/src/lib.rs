//! Terminal front end for the MaiOpinion diagnostic client.

pub mod cli;
pub mod render;
