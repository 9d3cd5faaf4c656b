//! Paragraph and segment repository.
//!
//! Paragraph rows carry layout and a content hash; segment rows carry the
//! translated pieces. Segments cascade away with their paragraph.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};

use super::DatabaseError;
use crate::model::{ParagraphMeta, ParagraphResult, SegmentProgressEntry, SegmentResult};

/// Inserts the paragraph row if it does not exist yet. An existing row keeps
/// its layout, but a blank content hash is filled in from `meta` and a
/// planned count from `meta` replaces the stored one.
pub fn ensure_paragraph(
    conn: &Connection,
    translation_id: &str,
    paragraph_idx: usize,
    meta: Option<&ParagraphMeta>,
) -> Result<(), DatabaseError> {
    let (indent, separator, hash, planned) = match meta {
        Some(m) => (
            m.indent.as_str(),
            m.separator.as_str(),
            m.content_hash.as_str(),
            m.planned_segments.map(|n| n as i64),
        ),
        None => ("", "", "", None),
    };
    conn.execute(
        "INSERT INTO translation_paragraphs
             (translation_id, paragraph_idx, indent, separator, content_hash, planned_segments)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (translation_id, paragraph_idx) DO UPDATE
         SET content_hash = CASE
                 WHEN translation_paragraphs.content_hash = '' THEN excluded.content_hash
                 ELSE translation_paragraphs.content_hash
             END,
             planned_segments = COALESCE(excluded.planned_segments, translation_paragraphs.planned_segments)",
        params![translation_id, paragraph_idx as i64, indent, separator, hash, planned],
    )?;
    Ok(())
}

/// Inserts or overwrites a paragraph's layout and hash.
pub fn upsert_paragraph(
    conn: &Connection,
    translation_id: &str,
    paragraph_idx: usize,
    meta: &ParagraphMeta,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO translation_paragraphs
             (translation_id, paragraph_idx, indent, separator, content_hash, planned_segments)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (translation_id, paragraph_idx) DO UPDATE
         SET indent = excluded.indent,
             separator = excluded.separator,
             content_hash = excluded.content_hash,
             planned_segments = excluded.planned_segments",
        params![
            translation_id,
            paragraph_idx as i64,
            meta.indent,
            meta.separator,
            meta.content_hash,
            meta.planned_segments.map(|n| n as i64)
        ],
    )?;
    Ok(())
}

pub fn paragraph_hashes(
    conn: &Connection,
    translation_id: &str,
) -> Result<BTreeMap<usize, String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT paragraph_idx, content_hash FROM translation_paragraphs
         WHERE translation_id = ?1 ORDER BY paragraph_idx ASC",
    )?;
    let rows = stmt
        .query_map(params![translation_id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(idx, hash)| (idx.max(0) as usize, hash))
        .collect())
}

/// Deletes a paragraph together with its segments.
pub fn delete_paragraph(
    conn: &Connection,
    translation_id: &str,
    paragraph_idx: usize,
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM translation_paragraphs WHERE translation_id = ?1 AND paragraph_idx = ?2",
        params![translation_id, paragraph_idx as i64],
    )?;
    Ok(())
}

pub fn insert_segment(
    conn: &Connection,
    translation_id: &str,
    paragraph_idx: usize,
    seg_idx: usize,
    result: &SegmentResult,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO translation_segments
         (translation_id, paragraph_idx, seg_idx, segment_text, pinyin, english, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            translation_id,
            paragraph_idx as i64,
            seg_idx as i64,
            result.segment,
            result.pinyin,
            result.english,
            now
        ],
    )?;
    Ok(())
}

/// Returns how many segments were removed.
pub fn delete_segments(
    conn: &Connection,
    translation_id: &str,
    paragraph_idx: usize,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM translation_segments WHERE translation_id = ?1 AND paragraph_idx = ?2",
        params![translation_id, paragraph_idx as i64],
    )?;
    Ok(affected)
}

/// Stored segment count per paragraph. Paragraphs without segments map to 0.
pub fn segment_counts(
    conn: &Connection,
    translation_id: &str,
) -> Result<BTreeMap<usize, usize>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.paragraph_idx, COUNT(s.seq)
         FROM translation_paragraphs p
         LEFT JOIN translation_segments s
           ON s.translation_id = p.translation_id AND s.paragraph_idx = p.paragraph_idx
         WHERE p.translation_id = ?1
         GROUP BY p.paragraph_idx
         ORDER BY p.paragraph_idx ASC",
    )?;
    let rows = stmt
        .query_map(params![translation_id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(idx, n)| (idx.max(0) as usize, n.max(0) as usize))
        .collect())
}

pub fn count_segments(conn: &Connection, translation_id: &str) -> Result<usize, DatabaseError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM translation_segments WHERE translation_id = ?1",
        params![translation_id],
        |r| r.get(0),
    )?;
    Ok(n.max(0) as usize)
}

/// Loads every paragraph with its segments in canonical order.
pub fn load_paragraphs(
    conn: &Connection,
    translation_id: &str,
) -> Result<Vec<ParagraphResult>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT paragraph_idx, indent, separator FROM translation_paragraphs
         WHERE translation_id = ?1 ORDER BY paragraph_idx ASC",
    )?;
    let layout = stmt
        .query_map(params![translation_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut seg_stmt = conn.prepare(
        "SELECT paragraph_idx, segment_text, pinyin, english FROM translation_segments
         WHERE translation_id = ?1 ORDER BY paragraph_idx ASC, seg_idx ASC",
    )?;
    let mut by_paragraph: BTreeMap<i64, Vec<SegmentResult>> = BTreeMap::new();
    let segments = seg_stmt.query_map(params![translation_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            SegmentResult {
                segment: r.get(1)?,
                pinyin: r.get(2)?,
                english: r.get(3)?,
            },
        ))
    })?;
    for segment in segments {
        let (idx, result) = segment?;
        by_paragraph.entry(idx).or_default().push(result);
    }

    Ok(layout
        .into_iter()
        .map(|(idx, indent, separator)| ParagraphResult {
            translations: by_paragraph.remove(&idx).unwrap_or_default(),
            indent,
            separator,
        })
        .collect())
}

/// Non-empty english fields in canonical order.
pub fn english_parts(conn: &Connection, translation_id: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT english FROM translation_segments
         WHERE translation_id = ?1 AND TRIM(english) != ''
         ORDER BY paragraph_idx ASC, seg_idx ASC",
    )?;
    let parts = stmt
        .query_map(params![translation_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts)
}

/// Every segment in (paragraph, ordinal) order, each tagged with its
/// position in that order.
pub fn segments_in_order(
    conn: &Connection,
    translation_id: &str,
) -> Result<Vec<SegmentProgressEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT paragraph_idx, segment_text, pinyin, english FROM translation_segments
         WHERE translation_id = ?1 ORDER BY paragraph_idx ASC, seg_idx ASC",
    )?;
    let rows = stmt
        .query_map(params![translation_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(index, (pidx, segment, pinyin, english))| SegmentProgressEntry {
            segment,
            pinyin,
            english,
            index,
            paragraph_index: pidx.max(0) as usize,
        })
        .collect())
}

/// Planned result counts of the paragraphs that have one.
pub fn planned_segment_counts(
    conn: &Connection,
    translation_id: &str,
) -> Result<BTreeMap<usize, usize>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT paragraph_idx, planned_segments FROM translation_paragraphs
         WHERE translation_id = ?1 AND planned_segments IS NOT NULL",
    )?;
    let rows = stmt
        .query_map(params![translation_id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(idx, n)| (idx.max(0) as usize, n.max(0) as usize))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    const NOW: &str = "2026-01-01T00:00:00.000000000Z";

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO translations (id, created_at, updated_at, input_text)
                 VALUES ('t1', ?1, ?1, 'x')",
                params![NOW],
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn meta(indent: &str, separator: &str, hash: &str) -> ParagraphMeta {
        ParagraphMeta {
            indent: indent.to_string(),
            separator: separator.to_string(),
            content_hash: hash.to_string(),
            planned_segments: None,
        }
    }

    #[test]
    fn test_ensure_paragraph_fills_blank_hash_only() {
        let db = seeded();
        db.with_conn(|conn| {
            ensure_paragraph(conn, "t1", 0, None)?;
            ensure_paragraph(conn, "t1", 0, Some(&meta("  ", "\n", "h1")))?;
            ensure_paragraph(conn, "t1", 0, Some(&meta("", "", "h2")))?;
            let hashes = paragraph_hashes(conn, "t1")?;
            assert_eq!(hashes.get(&0).map(String::as_str), Some("h1"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_planned_count_survives_bare_ensure() {
        let db = seeded();
        db.with_conn(|conn| {
            let mut planned = meta("", "", "h1");
            planned.planned_segments = Some(3);
            ensure_paragraph(conn, "t1", 0, Some(&planned))?;
            ensure_paragraph(conn, "t1", 0, None)?;
            ensure_paragraph(conn, "t1", 1, None)?;

            let counts = planned_segment_counts(conn, "t1")?;
            assert_eq!(counts.get(&0), Some(&3));
            assert_eq!(counts.get(&1), None);

            upsert_paragraph(conn, "t1", 0, &meta("", "", "h2"))?;
            assert!(planned_segment_counts(conn, "t1")?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_load_paragraphs_in_canonical_order() {
        let db = seeded();
        db.with_conn(|conn| {
            upsert_paragraph(conn, "t1", 1, &meta("", "", "b"))?;
            upsert_paragraph(conn, "t1", 0, &meta("  ", "\n", "a"))?;
            insert_segment(conn, "t1", 1, 1, &SegmentResult::new("世界", "shì jiè", "world"), NOW)?;
            insert_segment(conn, "t1", 0, 0, &SegmentResult::new("你好", "nǐ hǎo", "hello"), NOW)?;

            let paragraphs = load_paragraphs(conn, "t1")?;
            assert_eq!(paragraphs.len(), 2);
            assert_eq!(paragraphs[0].indent, "  ");
            assert_eq!(paragraphs[0].translations[0].english, "hello");
            assert_eq!(paragraphs[1].translations[0].english, "world");

            let ordered = segments_in_order(conn, "t1")?;
            assert_eq!(ordered[0].english, "hello");
            assert_eq!(ordered[0].index, 0);
            assert_eq!(ordered[1].english, "world");
            assert_eq!(ordered[1].index, 1);
            assert_eq!(ordered[1].paragraph_index, 1);

            assert_eq!(english_parts(conn, "t1")?, vec!["hello", "world"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_segment_counts_include_empty_paragraphs() {
        let db = seeded();
        db.with_conn(|conn| {
            ensure_paragraph(conn, "t1", 0, None)?;
            ensure_paragraph(conn, "t1", 1, None)?;
            insert_segment(conn, "t1", 0, 0, &SegmentResult::new("a", "", "a"), NOW)?;
            insert_segment(conn, "t1", 0, 1, &SegmentResult::new("b", "", "b"), NOW)?;

            let counts = segment_counts(conn, "t1")?;
            assert_eq!(counts.get(&0), Some(&2));
            assert_eq!(counts.get(&1), Some(&0));
            assert_eq!(count_segments(conn, "t1")?, 2);

            assert_eq!(delete_segments(conn, "t1", 0)?, 2);
            assert_eq!(count_segments(conn, "t1")?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete_paragraph_cascades_segments() {
        let db = seeded();
        db.with_conn(|conn| {
            ensure_paragraph(conn, "t1", 0, None)?;
            insert_segment(conn, "t1", 0, 0, &SegmentResult::new("a", "", "a"), NOW)?;
            delete_paragraph(conn, "t1", 0)?;
            assert_eq!(count_segments(conn, "t1")?, 0);
            assert!(paragraph_hashes(conn, "t1")?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_segment_requires_paragraph_row() {
        let db = seeded();
        let result = db.with_conn(|conn| {
            insert_segment(conn, "t1", 3, 0, &SegmentResult::new("a", "", "a"), NOW)
        });
        assert!(result.is_err());
    }
}
