pub mod common;

mod character_store_tests;
mod job_queue_tests;
