//! Pure helpers for `MEMORY_SAVE:` facts.

/// Line prefix that marks a fact worth keeping across runs.
pub const FACT_MARKER: &str = "MEMORY_SAVE:";

/// Split marker lines out of a reply.
///
/// Returns the reply without its marker lines, and the non-empty fact texts in
/// the order they appeared.
pub fn extract_fact_lines(reply: &str) -> (String, Vec<String>) {
    let mut kept = Vec::new();
    let mut facts = Vec::new();

    for line in reply.lines() {
        match line.trim().strip_prefix(FACT_MARKER) {
            Some(fact) => {
                let fact = fact.trim();
                if !fact.is_empty() {
                    facts.push(fact.to_string());
                }
            }
            None => kept.push(line),
        }
    }

    (kept.join("\n").trim().to_string(), facts)
}

/// Append `new` to `existing`, skipping exact duplicates, preserving order.
pub fn merge_facts(existing: &mut Vec<String>, new: impl IntoIterator<Item = String>) {
    for fact in new {
        if !existing.contains(&fact) {
            existing.push(fact);
        }
    }
}

/// Order-preserving exact dedupe.
pub fn dedupe_facts(facts: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(facts.len());
    merge_facts(&mut out, facts);
    out
}

/// Pull the outermost JSON string array out of a model reply.
///
/// Models tend to wrap the array in prose or code fences, so only the slice
/// between the first `[` and the last `]` is parsed.
pub fn parse_fact_array(reply: &str) -> anyhow::Result<Vec<String>> {
    let start = reply
        .find('[')
        .ok_or_else(|| anyhow::anyhow!("no JSON array in compaction reply"))?;
    let end = reply
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow::anyhow!("unterminated JSON array in compaction reply"))?;

    let facts: Vec<String> = serde_json::from_str(&reply[start..=end])
        .map_err(|err| anyhow::anyhow!("parse compaction reply: {err}"))?;
    Ok(facts
        .into_iter()
        .map(|fact| fact.trim().to_string())
        .filter(|fact| !fact.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_marker_lines_and_strips_them() {
        let reply = "Run the tests.\nMEMORY_SAVE: uses cargo nextest\n  MEMORY_SAVE:   repo is a workspace  \nThen report.";
        let (cleaned, facts) = extract_fact_lines(reply);
        assert_eq!(cleaned, "Run the tests.\nThen report.");
        assert_eq!(facts, vec!["uses cargo nextest", "repo is a workspace"]);
    }

    #[test]
    fn empty_marker_is_dropped() {
        let (cleaned, facts) = extract_fact_lines("MEMORY_SAVE:\nls");
        assert_eq!(cleaned, "ls");
        assert!(facts.is_empty());
    }

    #[test]
    fn marker_mid_line_is_not_a_fact() {
        let (cleaned, facts) = extract_fact_lines("say MEMORY_SAVE: x");
        assert_eq!(cleaned, "say MEMORY_SAVE: x");
        assert!(facts.is_empty());
    }

    #[test]
    fn merge_skips_duplicates_in_order() {
        let mut facts = vec!["a".to_string(), "b".to_string()];
        merge_facts(&mut facts, vec!["b".to_string(), "c".to_string(), "a".to_string()]);
        assert_eq!(facts, vec!["a", "b", "c"]);
        assert_eq!(
            dedupe_facts(vec!["x".into(), "y".into(), "x".into()]),
            vec!["x", "y"]
        );
    }

    #[test]
    fn parses_array_wrapped_in_prose() {
        let reply = "Here you go:\n```json\n[\"one\", \" two \", \"\"]\n```";
        assert_eq!(parse_fact_array(reply).expect("parse"), vec!["one", "two"]);
    }

    #[test]
    fn rejects_reply_without_array() {
        assert!(parse_fact_array("no facts").is_err());
        assert!(parse_fact_array("] backwards [").is_err());
        assert!(parse_fact_array("[1, 2]").is_err());
    }
}
