//! Extraction of `{{path}}` references from input mapping templates.
//!
//! Templates use handlebars-style markers. Only plain value references are
//! relevant for reachability analysis; block helpers (`{{#each}}`,
//! `{{/each}}`), negations (`{{^missing}}`), comments (`{{!note}}`) and
//! `{{else}}` are control flow and carry no data path of their own.

/// Collect the variable paths referenced by a template string.
///
/// Returns each `{{path}}` reference with surrounding whitespace trimmed, in
/// order of appearance. Duplicates are preserved; callers that only care
/// about distinct roots can dedup.
pub fn template_refs(template: &str) -> Vec<String> {
  let mut refs = Vec::new();
  let mut rest = template;

  while let Some(open) = rest.find("{{") {
    let after = &rest[open + 2..];
    let Some(close) = after.find("}}") else {
      break;
    };

    let inner = after[..close].trim();
    if !inner.is_empty() && !is_marker(inner) {
      // A reference may carry helper arguments ("{{format date}}"); the
      // leading token is the data path.
      if let Some(path) = inner.split_whitespace().next() {
        refs.push(path.to_string());
      }
    }

    rest = &after[close + 2..];
  }

  refs
}

/// The root segment of a reference path: everything before the first `.`.
pub(crate) fn path_root(path: &str) -> &str {
  path.split('.').next().unwrap_or(path)
}

fn is_marker(inner: &str) -> bool {
  inner.starts_with('#')
    || inner.starts_with('/')
    || inner.starts_with('^')
    || inner.starts_with('!')
    || inner.starts_with('>')
    || inner == "else"
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_plain_references() {
    let refs = template_refs("Hello {{form.name}}, id {{ system.task_id }}");
    assert_eq!(refs, vec!["form.name", "system.task_id"]);
  }

  #[test]
  fn ignores_block_and_negation_markers() {
    let refs = template_refs("{{#each items}}{{label}}{{/each}}{{^empty}}x{{/empty}}{{!note}}");
    assert_eq!(refs, vec!["label"]);
  }

  #[test]
  fn ignores_else_and_unclosed_braces() {
    let refs = template_refs("{{#if a}}{{a.b}}{{else}}{{c}}{{/if}} {{broken");
    assert_eq!(refs, vec!["a.b", "c"]);
  }

  #[test]
  fn keeps_leading_token_of_helper_calls() {
    let refs = template_refs("{{upstream.field extra args}}");
    assert_eq!(refs, vec!["upstream.field"]);
  }

  #[test]
  fn path_root_splits_on_first_dot() {
    assert_eq!(path_root("form.fields.name"), "form");
    assert_eq!(path_root("system"), "system");
  }
}
