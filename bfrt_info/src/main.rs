/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

use anyhow::{Context, Result};

use bfrt::Registry;

use clap::Parser;

use std::fs;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prints the tables and learn filters of a BF Runtime program schema.
#[derive(Parser)]
#[clap(version, about)]
struct Args {
    /// bfrt.json file describing the program
    #[clap(value_name = "BFRT.JSON")]
    input: PathBuf,

    /// Name to load the program under (the file stem, by default)
    #[clap(short, long, value_name = "PROGRAM")]
    program: Option<String>,

    /// Print only this table, by full name or unambiguous suffix
    #[clap(short, long, value_name = "TABLE")]
    table: Option<String>,

    /// Also print learn filters
    #[clap(short, long)]
    learn: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let blob = fs::read(&args.input)
        .with_context(|| format!("{}: could not read schema", args.input.display()))?;
    let name = match &args.program {
        Some(name) => name.clone(),
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let program = Registry::new()
        .load(&name, &blob)
        .with_context(|| format!("{}: could not parse schema", args.input.display()))?;
    info!("{}: {} tables", name, program.schema().tables.len());

    match &args.table {
        Some(table) => println!("{}", program.table(table)?),
        None => {
            for table in program.tables() {
                println!("{}", table);
            }
        }
    }
    if args.learn {
        for filter in &program.schema().learn_filters {
            println!("{}", filter);
        }
    }
    Ok(())
}
