pub mod console;
pub mod controller;
pub mod events;
pub mod jump;
pub mod surface;
