pub mod history;
pub mod order;
pub mod quality;
pub mod stage;

pub use history::*;
pub use order::*;
pub use quality::*;
pub use stage::*;
