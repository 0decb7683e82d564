//! Command-line front end

pub mod run;
