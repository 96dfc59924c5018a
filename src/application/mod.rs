// Application layer - Use cases and repository contract
pub mod catalog_service;
pub mod page_service;
pub mod pages;
pub mod recovery_repository;
pub mod streaming_service;

#[cfg(test)]
pub mod memory_repository;
