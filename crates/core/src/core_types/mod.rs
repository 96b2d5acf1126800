//! Core value types shared by the grid, solver and accumulation modules

pub mod vec3;

pub use vec3::Vec3;
