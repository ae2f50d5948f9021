use colored::Colorize;

/// Running tallies for one sorting run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub collected: usize,
    pub collect_failed: usize,
    pub routed: usize,
    pub renamed: usize,
    /// Files that could not be classified.
    pub skipped: usize,
    /// Files already at their destination from an earlier run.
    pub already_placed: usize,
    pub failed: usize,
}

impl RunStats {
    #[must_use]
    pub const fn total_failed(&self) -> usize {
        self.collect_failed + self.failed
    }

    pub fn print_summary(&self, dryrun: bool) {
        let header = if dryrun {
            "\n--- Sort Summary (dryrun) ---"
        } else {
            "\n--- Sort Summary ---"
        };
        println!("{}", header.bold().magenta());
        println!("Files collected:        {}", self.collected);
        println!("Files routed:           {}", self.routed);
        println!("Files renamed:          {}", self.renamed);
        println!("Already in place:       {}", self.already_placed);
        println!(
            "Files skipped:          {}",
            if self.skipped > 0 {
                self.skipped.to_string().yellow()
            } else {
                "0".normal()
            }
        );
        println!(
            "Files failed:           {}",
            if self.total_failed() > 0 {
                self.total_failed().to_string().red()
            } else {
                "0".normal()
            }
        );
    }
}
