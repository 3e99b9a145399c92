//! Line-indexed comment blocks
//!
//! Consecutive standalone line comments are grouped into one block so the
//! annotation layer can ask for "the comment block right above line N".

use std::collections::BTreeMap;

use super::ast::TextRange;
use super::lexer::Comment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBlock {
    pub lines: Vec<String>,
    pub range: TextRange,
    /// Head-of-line block (standalone); trailing blocks follow code.
    pub head: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CommentTable {
    blocks: Vec<CommentBlock>,
    by_end_line: BTreeMap<u32, usize>,
}

impl CommentTable {
    pub fn from_comments(comments: Vec<Comment>) -> Self {
        let mut blocks: Vec<CommentBlock> = Vec::new();
        for comment in comments {
            let lines: Vec<String> = comment.text.lines().map(str::to_string).collect();
            let head = !comment.trailing;
            if let Some(last) = blocks.last_mut() {
                if head && last.head && last.range.end.line + 1 == comment.range.start.line {
                    last.lines.extend(lines);
                    last.range = last.range.cover(comment.range);
                    continue;
                }
            }
            blocks.push(CommentBlock {
                lines,
                range: comment.range,
                head,
            });
        }
        let by_end_line = blocks
            .iter()
            .enumerate()
            .map(|(idx, block)| (block.range.end.line, idx))
            .collect();
        Self {
            blocks,
            by_end_line,
        }
    }

    pub fn blocks(&self) -> &[CommentBlock] {
        &self.blocks
    }

    /// The standalone block ending on the line right above `line`.
    pub fn head_block_before(&self, line: u32) -> Option<&CommentBlock> {
        let prev = line.checked_sub(1)?;
        self.by_end_line
            .get(&prev)
            .map(|&idx| &self.blocks[idx])
            .filter(|block| block.head)
    }

    /// A trailing comment starting on `line`.
    pub fn trailing_on(&self, line: u32) -> Option<&CommentBlock> {
        self.blocks
            .iter()
            .find(|block| !block.head && block.range.start.line == line)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
