//! Inputs shared by the codec benchmarks.

use criterion::{BatchSize, Throughput};

/// How much work one iteration of a case does, which decides how inputs are batched.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Weight {
    Small,
    Normal,
    Large,
}

/// A named benchmark input.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    weight: Weight,
    file: TestFile,
}

impl TestCase {
    pub fn small(name: &'static str, file: TestFile) -> Self {
        Self { name, weight: Weight::Small, file }
    }

    pub fn normal(name: &'static str, file: TestFile) -> Self {
        Self { name, weight: Weight::Normal, file }
    }

    pub fn large(name: &'static str, file: TestFile) -> Self {
        Self { name, weight: Weight::Large, file }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    /// Bytes processed per iteration.
    pub fn throughput(&self) -> Throughput {
        Throughput::Bytes(self.file.content.len() as u64)
    }

    pub fn batch_size(&self) -> BatchSize {
        match self.weight {
            Weight::Small | Weight::Normal => BatchSize::SmallInput,
            Weight::Large => BatchSize::LargeInput,
        }
    }
}

/// Wire bytes loaded from `resources/`.
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    path: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(path: &'static str, content: &'static str) -> Self {
        Self { path, content }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn content(&self) -> &'static str {
        self.content
    }
}
