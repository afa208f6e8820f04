//! Text rendering of loaded documents for the shell.
//!
//! Every printer returns a `String`; the shell decides where it goes.

use std::fmt::Write as _;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table,
};

use cmo_format::header::RAW_HEADER_LEN;
use cmo_format::{
    CmoError, Context, FileInfo, FileObject, LiveObject, ManagerData, ObjectKind, StateChunk,
};

/// Paging and column layout of list output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListStyle {
    /// Entries per page.
    pub page_len: usize,
    /// Print every column instead of the short set.
    pub full: bool,
    /// Allow ANSI styling in tables.
    pub styled: bool,
}

impl Default for ListStyle {
    fn default() -> Self {
        Self {
            page_len: 10,
            full: false,
            styled: false,
        }
    }
}

/// Human readable byte count.
pub fn readable_size(size: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if size < 1024 {
        return format!("{size} Bytes");
    }
    #[allow(clippy::cast_precision_loss)]
    let mut value = size as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in UNITS.into_iter().skip(1) {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.2} {unit}")
}

/// Engine description of an error code.
pub fn error_description(error: &CmoError) -> &'static str {
    match error {
        CmoError::InvalidParameter { .. } => "One of the parameter passed to the function was invalid",
        CmoError::InvalidFile { .. } | CmoError::Compression { .. } => {
            "Attempt to load an invalid file"
        }
        CmoError::ObsoleteVersion { .. } => "The file was saved with an obsolete version of Virtools",
        CmoError::CrcMismatch { .. } => "Virtools file CRC error",
        CmoError::OutOfMemory { .. } => "There was not enough memory to perform the action",
        CmoError::Cancelled { .. } => "The operation was cancelled",
        CmoError::CantWriteFile { .. } | CmoError::Io(_) => {
            "Impossible to write to file (write-protection ?)"
        }
    }
}

pub fn file_info(info: &FileInfo) -> String {
    let (major, minor, build) = info.ck_version_parts();
    let [b0, b1, b2, b3] = info.product_build_parts();
    let mut out = String::from("CKFileInfo\n");
    let _ = writeln!(out, "FileVersion: {}", info.file_version);
    let _ = writeln!(out, "CKVersion: {major:02x}/{minor:02x}/{build:04x}");
    let _ = writeln!(
        out,
        "Product (Version / Build): {} / {b0}.{b1}.{b2}.{b3}",
        info.product_version
    );
    let _ = writeln!(out, "Save Flags: {}", info.write_mode);
    let _ = writeln!(out, "File Size: {}", readable_size(info.file_size));
    let _ = writeln!(out, "Crc: 0x{:x}", info.crc);
    out.push('\n');
    let _ = writeln!(
        out,
        "Hdr1 (Pack / UnPack): {} / {}",
        readable_size(info.hdr1_pack_size.into()),
        readable_size(info.hdr1_unpack_size.into())
    );
    let _ = writeln!(
        out,
        "Data (Pack / UnPack): {} / {}",
        readable_size(info.data_pack_size.into()),
        readable_size(info.data_unpack_size.into())
    );
    out.push('\n');
    let _ = writeln!(out, "Manager Count: {}", info.manager_count);
    let _ = writeln!(out, "Object Count: {}", info.object_count);
    let _ = writeln!(out, "Max ID Saved: {}", info.max_id_saved);
    out
}

/// One page of object entries. `indices` selects the entries, in order, out
/// of `objects`; `page` is zero based.
pub fn object_list(
    title: &str,
    objects: &[FileObject],
    indices: &[usize],
    info: &FileInfo,
    page: usize,
    style: ListStyle,
) -> String {
    let Some(range) = page_range(indices.len(), page, style.page_len) else {
        return String::from("Page out of range.\n");
    };

    let mut table = Table::new();
    if style.full {
        table.set_header(header_cells(&[
            "SaveFlags",
            "Options",
            "CK ID",
            "File CK ID",
            "File Index",
            "Pack Size",
            "Index",
            "Type",
            "CKObject",
            "CKStateChunk",
            "Name",
        ]));
    } else {
        table.set_header(header_cells(&["Index", "Type", "Object", "Chunk", "Name"]));
    }
    apply_table_style(&mut table, style);

    let header_end = u32::try_from(RAW_HEADER_LEN)
        .unwrap_or(u32::MAX)
        .wrapping_add(info.hdr1_unpack_size);
    for &index in &indices[range] {
        let Some(obj) = objects.get(index) else {
            continue;
        };
        let mut row = Vec::new();
        if style.full {
            row.push(Cell::new(format!("0x{:08x}", obj.save_flags)));
            row.push(Cell::new(obj.options));
            row.push(Cell::new(obj.created_id));
            row.push(Cell::new(obj.object_id));
            row.push(Cell::new(format!(
                "0x{:08x} (Rel: 0x{:08x})",
                obj.file_index,
                obj.file_index.wrapping_sub(header_end)
            )));
            row.push(Cell::new(format!("0x{:08x}", obj.pack_size)));
        }
        row.push(Cell::new(format!("#{index}")));
        row.push(Cell::new(obj.class_id));
        row.push(yes_no_cell(!obj.created_id.is_null()));
        row.push(yes_no_cell(obj.chunk.is_some()));
        row.push(name_cell(&obj.name));
        table.add_row(row);
    }

    with_page_footer(title, &table, page, indices.len(), style.page_len)
}

/// One page of manager entries.
pub fn manager_list(managers: &[ManagerData], page: usize, style: ListStyle) -> String {
    let Some(range) = page_range(managers.len(), page, style.page_len) else {
        return String::from("Page out of range.\n");
    };

    let mut table = Table::new();
    table.set_header(header_cells(&["Index", "CKGUID", "CKStateChunk"]));
    apply_table_style(&mut table, style);
    for (index, manager) in managers.iter().enumerate().skip(range.start).take(range.len()) {
        table.add_row(vec![
            Cell::new(format!("#{index}")),
            Cell::new(manager.guid),
            yes_no_cell(manager.chunk.is_some()),
        ]);
    }

    with_page_footer("CKFileManager", &table, page, managers.len(), style.page_len)
}

pub fn state_chunk(chunk: Option<&StateChunk>, style: ListStyle) -> String {
    let mut out = String::from("CKStateChunk\n");
    let Some(chunk) = chunk else {
        out.push_str("Null Chunk\n");
        return out;
    };

    let profile = chunk.profile();
    let _ = writeln!(out, "Type: {}", profile.class_id);
    let _ = writeln!(
        out,
        "Version (Data / Chunk): {} / {}",
        profile.data_version, profile.chunk_version
    );
    let _ = writeln!(
        out,
        "List (Object / Chunk / Manager): {} / {} / {}",
        profile.object_list_len, profile.chunk_list_len, profile.manager_list_len
    );
    let _ = writeln!(out, "Data: 0x{:x} DWORD", profile.data_words);
    let _ = writeln!(out, "Bind File: {}", yes_no(profile.bound));

    let identifiers = chunk.identifiers_profile();
    if identifiers.is_empty() {
        return out;
    }
    out.push_str("\nIdentifiers\n");
    let mut table = Table::new();
    table.set_header(header_cells(&["Identifier", "Data Size"]));
    apply_table_style(&mut table, style);
    align_column(&mut table, 1, CellAlignment::Right);
    for ident in identifiers {
        table.add_row(vec![
            Cell::new(format!("0x{:08x}", ident.tag)),
            Cell::new(format!(
                "{} ({} DWORD + {})",
                ident.size,
                ident.size / 4,
                ident.size % 4
            )),
        ]);
    }
    let _ = writeln!(out, "{table}");
    out
}

/// Details of the live object behind a file entry.
pub fn live_object(ctx: &Context, object: Option<&LiveObject>, style: ListStyle) -> String {
    let mut out = String::from("CKObject\n");
    let Some(object) = object else {
        out.push_str("Null Object\n");
        return out;
    };

    let _ = writeln!(out, "Name: {}", display_name(object.name()));
    let _ = writeln!(out, "CK ID: {}", object.id());
    let class_id = object.class_id();
    match class_id.name() {
        Some(name) => {
            let _ = writeln!(out, "Class ID: {} ({name})", class_id.0);
        }
        None => {
            let _ = writeln!(out, "Class ID: {}", class_id.0);
        }
    }
    let _ = writeln!(out, "Visibility: {}", object.visibility);

    if let ObjectKind::Group { members } = &object.kind {
        let _ = writeln!(out, "Group Object Count: {}", members.len());
        if !members.is_empty() {
            let mut table = Table::new();
            table.set_header(header_cells(&["CK ID", "Type", "Name"]));
            apply_table_style(&mut table, style);
            for &id in members {
                let member = ctx.object(id);
                table.add_row(vec![
                    Cell::new(id),
                    member.map_or_else(|| Cell::new("-"), |m| Cell::new(m.class_id())),
                    member.map_or_else(|| Cell::new("<null>"), |m| name_cell(m.name())),
                ]);
            }
            let _ = writeln!(out, "{table}");
        }
    }
    out
}

/// Range of entries on a zero-based page, or `None` past the end.
fn page_range(total: usize, page: usize, page_len: usize) -> Option<std::ops::Range<usize>> {
    let start = page.checked_mul(page_len)?;
    if start >= total {
        return None;
    }
    Some(start..total.min(start.saturating_add(page_len)))
}

fn with_page_footer(title: &str, table: &Table, page: usize, total: usize, page_len: usize) -> String {
    let pages = total.div_ceil(page_len.max(1));
    format!("{title}\n{table}\nPage {} of {pages}\n", page + 1)
}

/// Columns beyond the simple object layout switch to the wide table.
const SIMPLE_COLUMNS: usize = 5;

fn apply_table_style(table: &mut Table, style: ListStyle) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS);
    let columns = table.column_count();
    if columns > SIMPLE_COLUMNS {
        // Only the trailing name column may wrap.
        table
            .set_content_arrangement(ContentArrangement::DynamicFullWidth)
            .set_width(200)
            .set_constraints(vec![ColumnConstraint::ContentWidth; columns - 1]);
    } else {
        table
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(120);
    }
    if !style.styled {
        table.force_no_tty();
    }
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cells(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| {
            Cell::new(label)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold)
        })
        .collect()
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

fn yes_no_cell(value: bool) -> Cell {
    if value {
        Cell::new("Yes").fg(Color::Green)
    } else {
        Cell::new("No").fg(Color::DarkGrey)
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<anonymous>" } else { name }
}

fn name_cell(name: &str) -> Cell {
    if name.is_empty() {
        Cell::new("<anonymous>").fg(Color::DarkGrey)
    } else if name.trim().is_empty() {
        Cell::new("<blank>").fg(Color::DarkGrey)
    } else {
        Cell::new(name)
    }
}
