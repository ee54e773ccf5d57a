use crate::record::{ResolvedMetadata, SourceKind, SourceRecord};

/// Fold records in precedence order. Earlier records win: a field set by one
/// record is never overwritten by a later one.
///
/// Scalars take the first non-empty (trimmed) or non-zero value. Authors
/// come whole from the first record with a non-empty list. `cited_by_count`
/// and each `extra` key go to the first record that defines them.
pub fn merge_records<'a, I>(records: I) -> ResolvedMetadata
where
    I: IntoIterator<Item = &'a SourceRecord>,
{
    let mut out = ResolvedMetadata::default();

    for record in records {
        let source = record.source;

        if out.authors.is_empty() && !record.authors.is_empty() {
            out.authors = record.authors.clone();
            out.field_sources.insert("authors".to_string(), source);
        }

        fill_text(&mut out, "title", source, record.title.as_deref(), |m| &mut m.title);
        fill_text(&mut out, "venue", source, record.venue.as_deref(), |m| &mut m.venue);
        fill_text(&mut out, "doi", source, record.doi.as_deref(), |m| &mut m.doi);
        fill_text(&mut out, "url", source, record.url.as_deref(), |m| &mut m.url);
        fill_text(
            &mut out,
            "open_access_pdf_url",
            source,
            record.open_access_pdf_url.as_deref(),
            |m| &mut m.open_access_pdf_url,
        );

        if out.year.is_none()
            && let Some(year) = record.year.filter(|y| *y != 0)
        {
            out.year = Some(year);
            out.field_sources.insert("year".to_string(), source);
        }

        if out.cited_by_count.is_none() && record.cited_by_count.is_some() {
            out.cited_by_count = record.cited_by_count;
            out.field_sources.insert("cited_by_count".to_string(), source);
        }

        for (key, value) in &record.extra {
            if !out.extra.contains_key(key) {
                out.extra.insert(key.clone(), value.clone());
                out.field_sources.insert(key.clone(), source);
            }
        }
    }

    out
}

fn fill_text(
    out: &mut ResolvedMetadata,
    field: &str,
    source: SourceKind,
    incoming: Option<&str>,
    slot: impl FnOnce(&mut ResolvedMetadata) -> &mut Option<String>,
) {
    let Some(value) = incoming.map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    let target = slot(out);
    if target.as_deref().is_none_or(|t| t.trim().is_empty()) {
        *target = Some(value.to_string());
        out.field_sources.insert(field.to_string(), source);
    }
}
