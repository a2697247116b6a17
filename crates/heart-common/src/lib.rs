pub mod audit;
pub mod error;
pub mod export;
pub mod openai;
pub mod polling;
pub mod sections;
