pub mod bootstrap;

pub use bootstrap::{run, screen_bonds, ScreenRequest};
