use std::fmt::Write;

use common::claims::{Claim, PermissionSet};
use common::context::{ReconciliationContext, View};

const PENDING_MARK: char = '*';

fn claim_cell(claim: Option<&Claim>, pending: bool) -> String {
    let mut cell = match claim {
        Some(Claim::Flag(true)) => "[x]".to_string(),
        Some(expires @ Claim::Expires(_)) => expires.to_string(),
        Some(Claim::Flag(false)) | None => "[ ]".to_string(),
    };
    if pending {
        cell.push(PENDING_MARK);
    }
    cell
}

/// The current view as a table of users and their effective claims
///
/// Cells holding an unsaved edit are marked with `*`.
pub fn render_users(ctx: &ReconciliationContext, permissions: &PermissionSet) -> String {
    let title = match ctx.view() {
        View::List => "Privileged users",
        View::Search => "Search results",
    };

    let users = ctx.visible_users();
    if users.is_empty() {
        return format!("{}: none", title);
    }

    let mut header: Vec<String> = vec!["NAME".to_string(), "EMAIL".to_string()];
    header.extend(permissions.iter().map(|p| p.label.clone()));

    let rows: Vec<Vec<String>> = users
        .iter()
        .map(|(user, claims)| {
            let edits = ctx.actions.get(&user.uid);
            let mut row = vec![user.name.clone(), user.email.clone()];
            row.extend(permissions.keys().map(|key| {
                let pending = edits.is_some_and(|e| e.get(key).is_some());
                claim_cell(claims.get(key), pending)
            }));
            row
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = format!("{} ({}):\n", title, rows.len());
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }

    if !ctx.actions.is_empty() {
        let _ = writeln!(
            out,
            "{} user(s) with unsaved edits ({} marks them)",
            ctx.actions.len(),
            PENDING_MARK
        );
    }
    out.trim_end().to_string()
}
