//! Decoded symbol data for one module.
//!
//! A [`SymbolTable`] is what a [`SymbolFileParser`](super::SymbolFileParser)
//! produces: documents, per-method sequence points and local scopes. Queries
//! are plain functions over this data, so a table can be shared read-only by
//! any number of threads.

use std::collections::BTreeMap;

use crate::types::{PdbKey, SequencePoint, SymbolFormat};

/// Local variable slot with its recorded name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable
{
    pub slot: u32,
    pub name: String,
}

/// Lexical scope inside a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalScope
{
    pub start_offset: u32,
    pub length: u32,
    pub variables: Vec<LocalVariable>,
}

impl LocalScope
{
    pub fn new(start_offset: u32, length: u32) -> Self
    {
        Self {
            start_offset,
            length,
            variables: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_variable(mut self, slot: u32, name: impl Into<String>) -> Self
    {
        self.variables.push(LocalVariable { slot, name: name.into() });
        self
    }

    pub fn variable(&self, slot: u32) -> Option<&LocalVariable>
    {
        self.variables.iter().find(|variable| variable.slot == slot)
    }
}

/// Debug information for one method definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSymbols
{
    sequence_points: Vec<SequencePoint>,
    scopes: Vec<LocalScope>,
}

impl MethodSymbols
{
    /// Sequence points are kept ordered by IL offset regardless of the order
    /// they are supplied in.
    pub fn new(mut sequence_points: Vec<SequencePoint>, scopes: Vec<LocalScope>) -> Self
    {
        sequence_points.sort_by_key(|point| point.il_offset);
        Self { sequence_points, scopes }
    }

    pub fn sequence_points(&self) -> &[SequencePoint]
    {
        &self.sequence_points
    }

    pub fn scopes(&self) -> &[LocalScope]
    {
        &self.scopes
    }
}

/// Decoded symbol file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable
{
    format: SymbolFormat,
    pdb_key: Option<PdbKey>,
    documents: Vec<String>,
    methods: BTreeMap<u32, MethodSymbols>,
}

impl SymbolTable
{
    pub fn new(format: SymbolFormat) -> Self
    {
        Self {
            format,
            pdb_key: None,
            documents: Vec::new(),
            methods: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_pdb_key(mut self, key: PdbKey) -> Self
    {
        self.pdb_key = Some(key);
        self
    }

    /// Add a document and return its index for use in sequence points.
    pub fn add_document(&mut self, name: impl Into<String>) -> u32
    {
        self.documents.push(name.into());
        u32::try_from(self.documents.len() - 1).unwrap_or(u32::MAX)
    }

    /// Add or replace the debug information of a method definition token.
    pub fn insert_method(&mut self, method_token: u32, method: MethodSymbols)
    {
        self.methods.insert(method_token, method);
    }

    pub fn format(&self) -> SymbolFormat
    {
        self.format
    }

    /// PDB id recorded in the symbol file itself, when the parser found one.
    pub fn pdb_key(&self) -> Option<PdbKey>
    {
        self.pdb_key
    }

    pub fn document(&self, index: u32) -> Option<&str>
    {
        self.documents.get(index as usize).map(String::as_str)
    }

    pub fn documents(&self) -> impl Iterator<Item = (u32, &str)>
    {
        (0u32..).zip(self.documents.iter().map(String::as_str))
    }

    pub fn method(&self, method_token: u32) -> Option<&MethodSymbols>
    {
        self.methods.get(&method_token)
    }

    /// Methods in ascending token order.
    pub fn methods(&self) -> impl Iterator<Item = (u32, &MethodSymbols)>
    {
        self.methods.iter().map(|(token, method)| (*token, method))
    }

    pub fn method_count(&self) -> usize
    {
        self.methods.len()
    }
}
