pub mod click;
pub mod decay;
pub mod engine;
pub mod locks;
pub mod rank;
