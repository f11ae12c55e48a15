use context_storage::Storage;
use std::collections::HashSet;

/// Result of scope-isolation preprocessing (§4.7.1): the query with
/// `@mention` tokens stripped, plus the resolved file-id allowlist.
/// `allowlist = Some(empty)` means the caller named files or folders that
/// resolved to nothing — every retrieval call must return zero hits.
pub struct ScopedQuery {
    pub query: String,
    pub allowlist: Option<Vec<String>>,
}

/// Extracts `@name` / `@"name with spaces"` mentions, resolves each via
/// `find_files_by_name`, intersects with the folder-id expansion when
/// both are present, and returns the cleaned query plus the resulting
/// allowlist.
pub fn resolve_scope(
    storage: &Storage,
    query: &str,
    folder_ids: Option<&[String]>,
) -> context_storage::Result<ScopedQuery> {
    let (cleaned, mentions) = extract_mentions(query);

    let mention_ids = if mentions.is_empty() {
        None
    } else {
        let mut ids = HashSet::new();
        for name in &mentions {
            for file in storage.find_files_by_name(name)? {
                ids.insert(file.file_id);
            }
        }
        Some(ids)
    };

    let folder_file_ids = match folder_ids {
        None => None,
        Some(folder_ids) if folder_ids.is_empty() => None,
        Some(folder_ids) => {
            let mut ids = HashSet::new();
            for folder_id in folder_ids {
                for file in storage.get_files_in_folder(folder_id)? {
                    ids.insert(file.file_id);
                }
            }
            Some(ids)
        }
    };

    let allowlist = match (mention_ids, folder_file_ids) {
        (Some(a), Some(b)) => Some(a.intersection(&b).cloned().collect()),
        (Some(a), None) => Some(a.into_iter().collect()),
        (None, Some(b)) => Some(b.into_iter().collect()),
        (None, None) => None,
    };

    Ok(ScopedQuery {
        query: cleaned,
        allowlist,
    })
}

/// Splits `@name` / `@"quoted name"` mentions out of `query`, returning
/// the mention-free query (whitespace collapsed) and the raw names.
fn extract_mentions(query: &str) -> (String, Vec<String>) {
    let mut mentions = Vec::new();
    let mut cleaned = String::with_capacity(query.len());
    let bytes = query.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'@' {
            let rest = &query[i + 1..];
            if let Some(quoted) = rest.strip_prefix('"') {
                if let Some(end) = quoted.find('"') {
                    mentions.push(quoted[..end].to_string());
                    i += 1 + 1 + end + 1;
                    continue;
                }
            }
            let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            if token_end > 0 {
                mentions.push(rest[..token_end].to_string());
                i += 1 + token_end;
                continue;
            }
        }
        let ch = query[i..].chars().next().unwrap_or(' ');
        cleaned.push(ch);
        i += ch.len_utf8();
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (collapsed, mentions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::{FileKind, FileRecord};

    fn storage_with_file(name: &str, folder_id: Option<&str>) -> (Storage, String) {
        let storage = Storage::open_in_memory().unwrap();
        let mut record = FileRecord::new("f1", name, FileKind::Text);
        record.folder_id = folder_id.map(str::to_string);
        storage.upsert_file(&record).unwrap();
        (storage, "f1".to_string())
    }

    #[test]
    fn plain_mention_is_stripped_and_resolved() {
        let (storage, file_id) = storage_with_file("report.pdf", None);
        let scoped = resolve_scope(&storage, "summarize @report.pdf please", None).unwrap();
        assert_eq!(scoped.query, "summarize please");
        assert_eq!(scoped.allowlist, Some(vec![file_id]));
    }

    #[test]
    fn quoted_mention_with_spaces_is_stripped() {
        let (storage, file_id) = storage_with_file("quarterly report.pdf", None);
        let scoped =
            resolve_scope(&storage, "what changed in @\"quarterly report.pdf\"?", None).unwrap();
        assert_eq!(scoped.query, "what changed in ?");
        assert_eq!(scoped.allowlist, Some(vec![file_id]));
    }

    #[test]
    fn mention_and_folder_filter_intersect() {
        let storage = Storage::open_in_memory().unwrap();
        let mut a = FileRecord::new("a", "report.pdf", FileKind::Text);
        a.folder_id = Some("folder1".to_string());
        storage.upsert_file(&a).unwrap();
        let mut b = FileRecord::new("b", "report.pdf", FileKind::Text);
        b.folder_id = Some("folder2".to_string());
        storage.upsert_file(&b).unwrap();

        let folder_ids = vec!["folder1".to_string()];
        let scoped = resolve_scope(&storage, "@report.pdf summary", Some(&folder_ids)).unwrap();
        assert_eq!(scoped.allowlist, Some(vec!["a".to_string()]));
    }

    #[test]
    fn no_filters_yields_no_allowlist() {
        let storage = Storage::open_in_memory().unwrap();
        let scoped = resolve_scope(&storage, "plain query", None).unwrap();
        assert!(scoped.allowlist.is_none());
        assert_eq!(scoped.query, "plain query");
    }
}
