//! `vaultweave` CLI: build, query, and inspect index directories.
//!
//! ```bash
//! vaultweave index build --in docs.linedoc --out ./idx --format token-only
//! vaultweave index query --in ./idx --terms "hello world" --phrase
//! vaultweave bloom build --in docs.linedoc --out ./idx --end --ratio 0.02 --entries 8
//! vaultweave inspect ./idx
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use vaultweave::bloom::BloomFilter;
use vaultweave::bloom_store::{BloomCase, BloomMeta, BloomStoreWriter};
use vaultweave::index::{DocInfo, Index, IndexBuilder};
use vaultweave::{Result, SearchError};

mod cli;
use cli::{BloomAction, Cli, Commands, IndexAction, LineDocFormat};

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Index { action } => match action {
            IndexAction::Build {
                input,
                output,
                format,
                n,
            } => run_index_build(&input, &output, format, n),
            IndexAction::Query {
                input,
                terms,
                phrase,
                top_k,
                snippets,
            } => run_index_query(&input, &terms, phrase, top_k, snippets),
        },
        Commands::Bloom { action } => match action {
            BloomAction::Build {
                input,
                output,
                begin,
                end,
                ratio,
                entries,
            } => run_bloom_build(&input, &output, begin, end, ratio, entries),
        },
        Commands::Inspect { dir } => run_inspect(&dir),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn run_index_build(input: &str, output: &str, format: LineDocFormat, n: Option<usize>) -> Result<()> {
    let pb = spinner("Reading line-doc corpus...");
    let mut builder = IndexBuilder::new();
    let mut count = 0usize;

    for line in line_doc::read_lines(input)? {
        if let Some(limit) = n {
            if count >= limit {
                break;
            }
        }
        let doc = line_doc::parse_line(&line?, format)?;
        builder.add_document(doc)?;
        count += 1;
        if count % 1000 == 0 {
            pb.set_message(format!("Indexed {count} documents..."));
        }
    }
    pb.finish_with_message(format!("Indexed {count} documents"));

    let pb = spinner("Writing index files...");
    builder.dump(std::path::Path::new(output))?;
    pb.finish_with_message(format!("Wrote index to {output}"));
    Ok(())
}

fn run_index_query(input: &str, terms: &str, phrase: bool, top_k: usize, snippets: bool) -> Result<()> {
    let index = Index::open(std::path::Path::new(input))?;
    let terms: Vec<Vec<u8>> = terms.split_whitespace().map(|t| t.as_bytes().to_vec()).collect();

    let result = if phrase {
        let mut bloom_skips = 0u64;
        let r = index.query_phrase(&terms, top_k, &mut bloom_skips, || false)?;
        eprintln!("(bloom pruned {bloom_skips} candidates without a positional check)");
        r
    } else {
        index.query_and(&terms, top_k, || false)?
    };

    if result.cancelled {
        eprintln!("warning: query was cancelled before completion");
    }

    let store = if snippets { Some(index.doc_store()?) } else { None };
    for hit in &result.hits {
        print!("{}\t{:.6}", hit.doc_id, hit.score);
        if let Some(ref store) = store {
            let body = store.body(hit.doc_id)?;
            print!("\t{}", String::from_utf8_lossy(body));
        }
        println!();
    }
    Ok(())
}

fn run_bloom_build(input: &str, output: &str, begin: bool, end: bool, ratio: f64, entries: usize) -> Result<()> {
    if begin == end {
        return Err(SearchError::usage("exactly one of --begin or --end is required"));
    }
    let prefix = if begin { "bloom_begin" } else { "bloom_end" };

    // One case list per term, grouping (doc_id, neighbour-word bloom filter)
    // entries in the order documents are read. A term's neighbour set is
    // every word immediately before (begin) or after (end) one of its
    // occurrences in that document.
    let mut cases: std::collections::BTreeMap<Vec<u8>, Vec<BloomCase>> = std::collections::BTreeMap::new();
    let mut doc_id = 0u32;

    for line in line_doc::read_lines(input)? {
        let doc = line_doc::parse_line(&line?, LineDocFormat::TokenOnly)?;
        for (i, term) in doc.terms.iter().enumerate() {
            let neighbour = if begin {
                i.checked_sub(1).map(|j| doc.terms[j].as_slice())
            } else {
                doc.terms.get(i + 1).map(|t| t.as_slice())
            };
            let Some(neighbour) = neighbour else { continue };
            let case_list = cases.entry(term.clone()).or_default();
            let needs_new_case = !matches!(case_list.last(), Some(c) if c.doc_id == doc_id);
            if needs_new_case {
                case_list.push(BloomCase {
                    doc_id,
                    filter: BloomFilter::new(ratio, entries),
                });
            }
            case_list.last_mut().unwrap().filter.add(neighbour);
        }
        doc_id += 1;
    }

    let mut writer = BloomStoreWriter::new();
    for (term, case_list) in &cases {
        writer.push_term(term, case_list);
    }
    let (store_bytes, index_writer) = writer.finish();
    let mut index_bytes = Vec::new();
    index_writer.encode(&mut index_bytes);

    let meta = BloomMeta {
        ratio: ratio as f32,
        expected_entries: entries as i32,
    };
    let mut meta_bytes = Vec::new();
    meta.encode(&mut meta_bytes);

    let dir = std::path::Path::new(output);
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(format!("{prefix}.store")), store_bytes)?;
    std::fs::write(dir.join(format!("{prefix}.index")), index_bytes)?;
    std::fs::write(dir.join(format!("{prefix}.meta")), meta_bytes)?;
    Ok(())
}

fn run_inspect(dir: &str) -> Result<()> {
    let path = std::path::Path::new(dir);
    let index = Index::open(path)?;
    println!("documents: {}", index.total_docs());
    for name in [
        vaultweave::index::VACUUM_FILE,
        vaultweave::index::TIP_FILE,
        vaultweave::index::DOC_LENGTH_FILE,
        vaultweave::index::FDX_FILE,
        vaultweave::index::FDT_FILE,
    ] {
        let size = std::fs::metadata(path.join(name)).map(|m| m.len()).unwrap_or(0);
        println!("{name}: {size} bytes");
    }
    Ok(())
}

/// Minimal parser for the tab-separated line-doc corpus format documents
/// are ingested from. This lives in the binary, not the library: the core
/// only ever consumes an iterator of `DocInfo`.
mod line_doc {
    use super::*;

    pub fn read_lines(path: &str) -> Result<impl Iterator<Item = std::io::Result<String>>> {
        let file = File::open(path)?;
        Ok(BufReader::new(file).lines())
    }

    /// Columns: `title | body | tokens` plus one optional column depending
    /// on `format`. `tokens` is whitespace-separated. The optional column
    /// groups by first-seen unique term, dot-separated between terms,
    /// semicolon-separated between that term's occurrences in token order:
    /// comma-separated `start,end` pairs for offsets, a bare integer for
    /// positions.
    pub fn parse_line(line: &str, format: LineDocFormat) -> Result<DocInfo> {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 3 {
            return Err(SearchError::corrupt("line-doc: expected at least 3 columns"));
        }
        let body = cols[1].as_bytes().to_vec();
        let tokens: Vec<&str> = cols[2].split_whitespace().collect();
        let terms: Vec<Vec<u8>> = tokens.iter().map(|t| t.as_bytes().to_vec()).collect();

        let mut first_seen: Vec<&str> = Vec::new();
        for t in &tokens {
            if !first_seen.contains(t) {
                first_seen.push(t);
            }
        }

        let mut positions: Vec<u32> = (0..tokens.len() as u32).collect();
        let mut offsets: Vec<(u32, u32)> = Vec::new();

        match format {
            LineDocFormat::TokenOnly => {}
            LineDocFormat::WithPositions => {
                let col = cols.get(3).copied().unwrap_or("");
                let by_term = split_grouped(col);
                positions = expand_grouped(&tokens, &first_seen, &by_term, |s| {
                    s.parse::<u32>()
                        .map_err(|_| SearchError::corrupt("line-doc: bad position integer"))
                })?;
            }
            LineDocFormat::WithOffsets => {
                let col = cols.get(3).copied().unwrap_or("");
                let by_term = split_grouped(col);
                let pairs = expand_grouped(&tokens, &first_seen, &by_term, |s| {
                    let (start, end) = s
                        .split_once(',')
                        .ok_or_else(|| SearchError::corrupt("line-doc: bad offset pair"))?;
                    let start: u32 = start
                        .parse()
                        .map_err(|_| SearchError::corrupt("line-doc: bad offset start"))?;
                    let end: u32 = end
                        .parse()
                        .map_err(|_| SearchError::corrupt("line-doc: bad offset end"))?;
                    Ok((start, end))
                })?;
                offsets = pairs;
            }
        }

        Ok(DocInfo {
            body,
            terms,
            positions,
            offsets,
        })
    }

    /// Split a `term1group.term2group...` column into per-term-occurrence
    /// groups (each itself `;`-separated).
    fn split_grouped(col: &str) -> Vec<Vec<&str>> {
        if col.is_empty() {
            return Vec::new();
        }
        col.split('.')
            .map(|group| group.split(';').filter(|s| !s.is_empty()).collect())
            .collect()
    }

    /// Walk the token stream in order, pulling the next occurrence's raw
    /// field for each token from its unique term's group (terms are
    /// grouped in `first_seen` order), and parse it with `parse`.
    fn expand_grouped<T>(
        tokens: &[&str],
        first_seen: &[&str],
        by_term: &[Vec<&str>],
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut cursors = vec![0usize; first_seen.len()];
        let mut out = Vec::with_capacity(tokens.len());
        for tok in tokens {
            let term_idx = first_seen
                .iter()
                .position(|t| t == tok)
                .ok_or_else(|| SearchError::corrupt("line-doc: token missing from group list"))?;
            let group = by_term
                .get(term_idx)
                .ok_or_else(|| SearchError::corrupt("line-doc: missing group for term"))?;
            let cursor = &mut cursors[term_idx];
            let raw = group
                .get(*cursor)
                .ok_or_else(|| SearchError::corrupt("line-doc: group has fewer occurrences than tokens"))?;
            *cursor += 1;
            out.push(parse(raw)?);
        }
        Ok(out)
    }
}
