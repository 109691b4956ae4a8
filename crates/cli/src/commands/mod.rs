pub mod embed;
pub mod search;
pub mod serve;
