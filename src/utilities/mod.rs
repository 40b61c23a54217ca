//! Shared helpers that do not belong to a single subsystem.

pub mod string_utils;
