//! Page models for the tracker's listing and detail views
//!
//! All functions here are synchronous and operate on a parsed [`Page`], which
//! must not be held across an await point.

use super::model::{Field, FieldSet, Note, Reference};
use crate::config::ListingConfig;
use crate::render::{Node, Page};
use crate::url::{page_number_of, resolve_href};
use url::Url;

/// Markers the tracker prints on an empty listing page
const NO_RECORDS_MARKERS: [&str; 2] = ["No issues found", "No records found"];

/// Words of note chrome (action buttons) that disqualify a content candidate
const NOTE_CHROME_WORDS: [&str; 4] = ["reply", "edit", "delete", "quote"];

/// Read access to the structured content of an issue detail view
///
/// Extraction goes through this trait rather than through positional scraping,
/// so a different tracker layout only needs a different implementation.
pub trait PageModel {
    /// Value of a labelled field, if present on the page
    fn get_field(&self, field: Field) -> Option<&str>;

    /// Notes in page order
    fn get_notes(&self) -> &[Note];
}

/// Issue detail view parsed from label/value table rows
#[derive(Debug, Clone, Default)]
pub struct IssuePage {
    fields: FieldSet,
    notes: Vec<Note>,
    has_tables: bool,
}

impl PageModel for IssuePage {
    fn get_field(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    fn get_notes(&self) -> &[Note] {
        &self.notes
    }
}

impl IssuePage {
    /// Parses a detail view
    ///
    /// Every row with at least two `td`/`th` cells is treated as a label/value
    /// pair. The lowercased label is matched against the field vocabulary by
    /// substring, and every matching field takes the value (later rows win).
    pub fn parse(page: &Page) -> Self {
        let tables = page.query_all("table");
        let mut fields = FieldSet::new();

        for table in &tables {
            let rows = table.query_all("tr");
            for (i, row) in rows.iter().enumerate() {
                let cells = row.query_all("td, th");
                if cells.len() < 2 {
                    continue;
                }

                let label = cells[0].text().to_lowercase();
                let value = cells[1].text();

                if !value.is_empty() {
                    for field in Field::ALL {
                        if label.contains(field.label()) {
                            fields.insert(field, value.clone());
                        }
                    }
                }

                // Header row layout: "ID | Category | ..." with the values on the
                // next row of the table, which may sit in a different section
                if label == "id" && value.to_lowercase().contains("category") {
                    if let Some(category) = rows
                        .get(i + 1)
                        .and_then(|next| next.query_all("td, th").get(1).map(Node::text))
                        .filter(|text| !text.is_empty())
                    {
                        fields.insert(Field::Category, category);
                    }
                }
            }
        }

        Self {
            fields,
            notes: parse_notes(page),
            has_tables: !tables.is_empty(),
        }
    }

    /// False if the page had no tables at all
    pub fn has_tables(&self) -> bool {
        self.has_tables
    }
}

fn parse_notes(page: &Page) -> Vec<Note> {
    let Some(container) = page.query("#bugnotes, .bugnotes") else {
        return Vec::new();
    };

    container
        .query_all(".bugnote")
        .iter()
        .map(parse_note)
        .filter(|note| !note.is_empty())
        .collect()
}

fn parse_note(element: &Node<'_>) -> Note {
    let descendants = element.descendants();
    let texts: Vec<String> = descendants.iter().map(Node::text).collect();

    let author = element
        .query(".bugnoteheader")
        .map(|header| header.text())
        .filter(|text| !text.is_empty())
        .or_else(|| {
            texts
                .iter()
                .find(|t| t.contains('(') && t.contains(')') && t.chars().count() > 5)
                .cloned()
        });

    let date_text = texts.iter().find(|t| is_date_like(t)).cloned();

    let content = element
        .query(".bugnote-note")
        .map(|note| note.text())
        .filter(|text| text.chars().count() > 5)
        .or_else(|| {
            element
                .query_all("p, div, span")
                .iter()
                .map(Node::text)
                .filter(|t| is_content_candidate(t))
                .max_by_key(|t| t.chars().count())
        });

    Note {
        author,
        date_text,
        content,
    }
}

fn is_date_like(text: &str) -> bool {
    let len = text.chars().count();
    let shaped = (text.contains(':') && len > 10) || (text.contains('-') && len > 8);
    shaped && !text.contains('[') && !text.contains(']')
}

fn is_content_candidate(text: &str) -> bool {
    if text.chars().count() <= 15 || text.contains('[') || text.contains(']') {
        return false;
    }
    let lower = text.to_lowercase();
    !NOTE_CHROME_WORDS.iter().any(|word| lower.contains(word))
}

/// What one listing page yielded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub references: Vec<Reference>,
    /// True if the page carried a "no records" marker
    pub no_records: bool,
    /// Highest page number linked from the pagination bar
    pub max_page: Option<u32>,
}

/// Parses one listing page
///
/// # Arguments
///
/// * `page` - The rendered listing page
/// * `base_url` - Base URL the id links are resolved against
/// * `layout` - Position of the issue table and its id column
pub fn parse_listing(page: &Page, base_url: &Url, layout: &ListingConfig) -> ListingPage {
    let body = page.body_text();
    let no_records = NO_RECORDS_MARKERS.iter().any(|m| body.contains(m));

    let max_page = page
        .query_all("a[href*='page_number']")
        .iter()
        .filter_map(|link| link.attribute("href"))
        .filter_map(|href| page_number_of(base_url, href))
        .max();

    let tables = page.query_all("table");
    let references = match tables.get(layout.table_index) {
        Some(table) => parse_listing_rows(table, base_url, layout),
        None => Vec::new(),
    };

    ListingPage {
        references,
        no_records,
        max_page,
    }
}

fn parse_listing_rows(table: &Node<'_>, base_url: &Url, layout: &ListingConfig) -> Vec<Reference> {
    let mut references = Vec::new();

    for row in table.query_all("tr").iter().skip(layout.header_rows) {
        let cells = row.query_all("td");
        if cells.len() < layout.min_columns {
            continue;
        }
        let Some(id_cell) = cells.get(layout.id_column) else {
            continue;
        };

        let id = id_cell.text();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        if let Some(url) = id_cell
            .query("a")
            .and_then(|link| link.attribute("href"))
            .and_then(|href| resolve_href(base_url, href))
        {
            references.push(Reference::new(id, url));
        }
    }

    references
}

/// One entry of the tracker's project selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
    pub id: String,
    pub name: String,
}

/// Reads the project selector, skipping the "all projects" entry
pub fn parse_projects(page: &Page) -> Vec<ProjectEntry> {
    let Some(select) = page.query("select[name='project_id']") else {
        return Vec::new();
    };

    select
        .query_all("option")
        .iter()
        .filter_map(|option| {
            let id = option.attribute("value")?.trim().to_string();
            let name = option.text();
            if id.is_empty() || id == "0" || name.is_empty() {
                None
            } else {
                Some(ProjectEntry { id, name })
            }
        })
        .collect()
}

/// Value of the currently selected option of the project selector
pub fn selected_project(page: &Page) -> Option<String> {
    page.query("select[name='project_id'] option[selected]")
        .and_then(|option| option.attribute("value").map(|v| v.trim().to_string()))
}
