use colored::*;
use std::io::{self, Write};

pub fn print_banner(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_agent(text: &str) {
    println!("{}", text.green());
}

pub fn print_step(text: &str) {
    println!("{}", text.dimmed());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
    let _ = io::stdout().flush();
}
