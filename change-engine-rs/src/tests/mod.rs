pub mod drafting_tests;
pub mod knowledge_tests;
pub mod mocks;
