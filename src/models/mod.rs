pub mod action;
pub mod marker;
pub mod stop;
pub mod tour;
