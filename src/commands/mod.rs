pub mod demo;
pub mod gates;
pub mod simulate;
