mod uniques;
mod word_count;

use anyhow::Result;
use jobjar::{runner, JobRegistry};

fn main() -> Result<()> {
    let mut registry = JobRegistry::new();
    word_count::register(&mut registry);
    uniques::register(&mut registry);
    runner::main(registry)
}
