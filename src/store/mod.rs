pub mod dead_letter;
pub mod jsonl;
pub mod repo;
