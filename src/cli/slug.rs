//! Slug command implementation

use crate::market::slug;
use clap::Args;

#[derive(Args, Debug)]
pub struct SlugArgs {
    /// Slug prefix, e.g. bitcoin-up-or-down
    pub prefix: String,

    /// Number of hours to print, starting with the current one
    #[arg(long, default_value_t = 2)]
    pub hours: usize,
}

impl SlugArgs {
    pub fn execute(&self) {
        for slug in slug::upcoming_slugs(&self.prefix, self.hours) {
            match slug::decode(&slug) {
                Some(start) => println!("{}  {}", slug, start.to_rfc3339()),
                None => println!("{}", slug),
            }
        }
    }
}
