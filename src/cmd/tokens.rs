//! Token analysis report (`condense tokens`).

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::path::Path;

use condense::analysis::{TokenReport, token_report};
use condense::batch::load_inputs;
use condense::models::ModelTable;

use super::super::Cli;
use super::load_config;

/// Report for one input file, or why it could not be read.
#[derive(Debug, Serialize)]
pub struct DocumentTokens {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TokenReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn cmd_tokens(cli: &Cli, work_dir: &Path, input: &Path, json: bool) -> Result<()> {
    let config = load_config(cli, work_dir)?;
    let models = config.toml.model_table();

    let inputs = load_inputs(input)
        .with_context(|| format!("Failed to load documents from {}", input.display()))?;
    let documents = inputs
        .into_iter()
        .map(|input| -> Result<DocumentTokens> {
            let (report, error) = match input.document {
                Ok(doc) => (Some(token_report(&doc.text, &models)?), None),
                Err(e) => (None, Some(e.to_string())),
            };
            Ok(DocumentTokens {
                name: input.name,
                report,
                error,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
    } else {
        for doc in &documents {
            print_document(doc, &models);
        }
    }

    // A lone unreadable file is an error; in a batch the others still count.
    if documents.len() == 1
        && let Some(error) = &documents[0].error
    {
        anyhow::bail!("{}", error);
    }
    Ok(())
}

fn print_document(doc: &DocumentTokens, models: &ModelTable) {
    println!();
    println!("{}", style(&doc.name).bold().cyan());
    let Some(report) = &doc.report else {
        if let Some(error) = &doc.error {
            println!("  {}", style(error).red());
        }
        return;
    };

    println!("  Sentences:  {}", report.stats.sentences);
    println!("  Words:      {}", report.stats.words);
    println!("  Characters: {}", report.stats.characters);
    println!();
    println!(
        "  {:<16} {:<12} {:>10} {:>12} {:>8}",
        "Model", "Encoding", "Tokens", "Input cost", "Fits"
    );
    for estimate in &report.estimates {
        let fits = models
            .get(&estimate.model_id)
            .map(|m| estimate.tokens <= m.context_tokens)
            .unwrap_or(false);
        println!(
            "  {:<16} {:<12} {:>10} {:>12} {:>8}",
            estimate.model_id,
            estimate.encoding.name(),
            estimate.tokens,
            format!("${:.4}", estimate.input_cost),
            if fits { "yes" } else { "no" }
        );
    }
}
