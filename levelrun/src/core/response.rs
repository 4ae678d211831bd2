//! Extraction of solution source from free-form assistant replies.

/// Pull solution source out of an assistant reply.
///
/// Prefers the first fenced block tagged with one of `languages`, then the first
/// fenced block of any kind, then the whole reply. Returns `None` for blank replies.
pub fn extract_solution_source(reply: &str, languages: &[&str]) -> Option<String> {
    let blocks = fenced_blocks(reply);
    let chosen = blocks
        .iter()
        .find(|block| {
            languages
                .iter()
                .any(|lang| block.info.eq_ignore_ascii_case(lang))
        })
        .or_else(|| blocks.first())
        .map(|block| block.body.clone())
        .unwrap_or_else(|| reply.to_string());

    let trimmed = chosen.trim_matches('\n');
    if trimmed.trim().is_empty() {
        return None;
    }
    let mut source = trimmed.to_string();
    source.push('\n');
    Some(source)
}

/// Fence info strings that identify source in the language of `extension`.
pub fn fence_tags(extension: &str) -> &'static [&'static str] {
    match extension {
        "py" => &["python", "python3", "py"],
        "sh" => &["sh", "bash", "shell"],
        "rs" => &["rust", "rs"],
        "js" => &["javascript", "js"],
        _ => &[],
    }
}

#[derive(Debug)]
struct FencedBlock {
    info: String,
    body: String,
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<FencedBlock> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if current.is_some() && trimmed.starts_with("```") {
            blocks.extend(current.take());
            continue;
        }
        match current.as_mut() {
            Some(block) => {
                block.body.push_str(line);
                block.body.push('\n');
            }
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    current = Some(FencedBlock {
                        info: info.trim().to_string(),
                        body: String::new(),
                    });
                }
            }
        }
    }
    // Unterminated fence: keep what we have.
    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}
