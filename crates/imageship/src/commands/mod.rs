pub mod container;
pub mod publish;
