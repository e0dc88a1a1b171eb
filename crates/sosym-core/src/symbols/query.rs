//! # Symbol Queries
//!
//! Read-only questions a debugger asks about a loaded module:
//!
//! - which statement an IL offset belongs to
//! - what a local variable slot is called
//! - which IL offset a source line starts at (for line breakpoints)
//! - what address an expression names
//!
//! Every handle-based query leases the table from the
//! [`ModuleSymbolCache`] for its duration. A disposed handle fails with
//! [`SymbolError::InvalidHandle`](crate::error::SymbolError::InvalidHandle);
//! data that simply is not there is `Ok(None)`.

use std::sync::Arc;

use super::cache::{ModuleSymbolCache, SymbolHandle};
use super::expression::{self, ExpressionHost};
use super::table::{MethodSymbols, SymbolTable};
use crate::error::SymbolResult;
use crate::types::identity::file_name_of;
use crate::types::{LineInfo, SequencePoint};

/// Query front end over a symbol cache.
#[derive(Clone)]
pub struct SymbolQueryEngine
{
    cache: Arc<ModuleSymbolCache>,
    expressions: Arc<dyn ExpressionHost>,
}

impl SymbolQueryEngine
{
    pub fn new(cache: Arc<ModuleSymbolCache>, expressions: Arc<dyn ExpressionHost>) -> Self
    {
        Self { cache, expressions }
    }

    /// Statement containing `il_offset` in the method.
    ///
    /// This is the last visible sequence point at or before the offset, never
    /// a later one.
    pub fn resolve_sequence_point(
        &self,
        handle: SymbolHandle,
        method_token: u32,
        il_offset: u32,
    ) -> SymbolResult<Option<SequencePoint>>
    {
        self.cache.lease(handle, |table| {
            table
                .method(method_token)
                .and_then(|method| enclosing_point(method, il_offset))
                .copied()
        })
    }

    /// Name of local `slot` in the scopes of method `scope`.
    ///
    /// `scope` is the method definition token. When several lexical scopes
    /// of the method declare the slot, the innermost (shortest IL range)
    /// wins, so a slot reused by a nested block reports the nested name.
    /// Scopes of equal length resolve to the one listed first.
    pub fn local_variable_name(&self, handle: SymbolHandle, scope: u32, slot: u32) -> SymbolResult<Option<String>>
    {
        self.cache.lease(handle, |table| {
            table
                .method(scope)
                .and_then(|method| local_name(method, slot))
                .map(str::to_string)
        })
    }

    /// Source line, column and file for an IL offset.
    pub fn line_by_il_offset(
        &self,
        handle: SymbolHandle,
        method_token: u32,
        il_offset: u32,
    ) -> SymbolResult<Option<LineInfo>>
    {
        self.cache.lease(handle, |table| line_info(table, method_token, il_offset))
    }

    /// Method token and IL offset of the first statement on `line` of `file`.
    pub fn resolve_source_line(&self, handle: SymbolHandle, file: &str, line: u32) -> SymbolResult<Option<(u32, u32)>>
    {
        self.cache.lease(handle, |table| source_line(table, file, line))
    }

    /// Address named by `text`, or 0 when it does not resolve.
    pub fn evaluate_expression(&self, text: &str) -> u64
    {
        expression::evaluate(text, self.expressions.as_ref())
    }
}

fn enclosing_point(method: &MethodSymbols, il_offset: u32) -> Option<&SequencePoint>
{
    let points = method.sequence_points();
    let end = points.partition_point(|point| point.il_offset <= il_offset);
    points[..end].iter().rev().find(|point| !point.is_hidden())
}

fn local_name(method: &MethodSymbols, slot: u32) -> Option<&str>
{
    method
        .scopes()
        .iter()
        .filter_map(|scope| scope.variable(slot).map(|variable| (scope.length, variable)))
        .min_by_key(|(length, _)| *length)
        .map(|(_, variable)| variable.name.as_str())
}

fn line_info(table: &SymbolTable, method_token: u32, il_offset: u32) -> Option<LineInfo>
{
    let point = enclosing_point(table.method(method_token)?, il_offset)?;
    Some(LineInfo {
        line: point.start_line,
        column: point.start_column,
        file: table.document(point.document)?.to_string(),
    })
}

fn document_matches(document: &str, file: &str) -> bool
{
    let normalized = |path: &str| path.replace('\\', "/").to_lowercase();
    let document = normalized(document);
    let file = normalized(file);
    document == file || (!file.contains('/') && file_name_of(&document) == file)
}

fn source_line(table: &SymbolTable, file: &str, line: u32) -> Option<(u32, u32)>
{
    let documents: Vec<u32> = table
        .documents()
        .filter(|(_, name)| document_matches(name, file))
        .map(|(index, _)| index)
        .collect();
    if documents.is_empty() {
        return None;
    }

    table.methods().find_map(|(token, method)| {
        method
            .sequence_points()
            .iter()
            .find(|point| !point.is_hidden() && point.start_line == line && documents.contains(&point.document))
            .map(|point| (token, point.il_offset))
    })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::symbols::table::LocalScope;
    use crate::types::SymbolFormat;

    fn table() -> SymbolTable
    {
        let mut table = SymbolTable::new(SymbolFormat::PortablePdb);
        let program = table.add_document(r"C:\src\App\Program.cs");
        table.insert_method(
            0x0600_0001,
            MethodSymbols::new(
                vec![
                    SequencePoint::new(0, program, 10, 5, 6),
                    SequencePoint::new(1, program, 11, 9, 30),
                    SequencePoint::hidden(8, program),
                    SequencePoint::new(12, program, 12, 9, 40),
                ],
                vec![
                    LocalScope::new(0, 20).with_variable(0, "outer").with_variable(1, "count"),
                    LocalScope::new(8, 4).with_variable(1, "inner"),
                ],
            ),
        );
        table
    }

    #[test]
    fn test_enclosing_point_skips_hidden()
    {
        let table = table();
        let method = table.method(0x0600_0001).unwrap();
        assert_eq!(enclosing_point(method, 0).unwrap().start_line, 10);
        assert_eq!(enclosing_point(method, 5).unwrap().start_line, 11);
        assert_eq!(enclosing_point(method, 9).unwrap().start_line, 11);
        assert_eq!(enclosing_point(method, 400).unwrap().start_line, 12);
    }

    #[test]
    fn test_innermost_scope_wins()
    {
        let table = table();
        let method = table.method(0x0600_0001).unwrap();
        assert_eq!(local_name(method, 1), Some("inner"));
        assert_eq!(local_name(method, 0), Some("outer"));
        assert_eq!(local_name(method, 7), None);
    }

    #[test]
    fn test_equal_scopes_prefer_first_declared()
    {
        let method = MethodSymbols::new(
            Vec::new(),
            vec![
                LocalScope::new(0, 6).with_variable(2, "first"),
                LocalScope::new(6, 6).with_variable(2, "second"),
            ],
        );
        assert_eq!(local_name(&method, 2), Some("first"));
    }

    #[test]
    fn test_line_info_reports_document()
    {
        let info = line_info(&table(), 0x0600_0001, 13).unwrap();
        assert_eq!(info.line, 12);
        assert_eq!(info.column, 9);
        assert_eq!(info.file, r"C:\src\App\Program.cs");
    }

    #[test]
    fn test_source_line_matching()
    {
        let table = table();
        assert_eq!(source_line(&table, "program.cs", 11), Some((0x0600_0001, 1)));
        assert_eq!(source_line(&table, "C:/src/App/Program.cs", 12), Some((0x0600_0001, 12)));
        assert_eq!(source_line(&table, "Other.cs", 11), None);
        assert_eq!(source_line(&table, "Program.cs", 99), None);
    }
}
