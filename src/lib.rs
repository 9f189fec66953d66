pub mod canvas;
pub mod cli;
pub mod components;
pub mod controller;
pub mod io;
pub mod logger;
pub mod ops;
pub mod persistence;
pub mod session;
pub mod settings;
pub mod view;
