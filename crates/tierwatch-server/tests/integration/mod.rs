pub mod common;

mod api_tests;
