//! Analytic placement for metric grids and stacked text blocks.
//!
//! Nothing here draws. Plans are computed from geometry alone so page breaks are known
//! before a single command is emitted, and the composer replays the plan onto a canvas.

use crate::types::{Margins, Pt, Rect, Size};

/// Column count for a grid holding `count` cards: up to 4 -> 2, 5..=9 -> 3, 10+ -> 4.
pub fn columns_for(count: usize) -> usize {
    match count {
        0..=4 => 2,
        5..=9 => 3,
        _ => 4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub page_size: Size,
    pub margins: Margins,
    pub card_height: Pt,
    pub gap: Pt,
    /// Where content resumes on a page opened by a break, below the redrawn header.
    pub content_top: Pt,
    pub footer_reserve: Pt,
}

impl GridGeometry {
    pub fn content_width(&self) -> Pt {
        (self.page_size.width - self.margins.left - self.margins.right).max(Pt::ZERO)
    }

    pub fn bottom_limit(&self) -> Pt {
        self.page_size.height - self.footer_reserve
    }

    pub fn card_width(&self, columns: usize) -> Pt {
        let columns = columns.max(1) as i32;
        let gaps = self.gap * (columns - 1);
        ((self.content_width() - gaps) / columns).max(Pt::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutCursor {
    pub x: Pt,
    pub y: Pt,
    pub column: usize,
    pub page_index: usize,
    pub page_height: Pt,
    pub margin: Pt,
    pub footer_reserve: Pt,
}

impl LayoutCursor {
    pub fn new(geometry: &GridGeometry, start_y: Pt) -> Self {
        Self {
            x: geometry.margins.left,
            y: start_y,
            column: 0,
            page_index: 0,
            page_height: geometry.page_size.height,
            margin: geometry.margins.left,
            footer_reserve: geometry.footer_reserve,
        }
    }

    pub fn fits(&self, height: Pt) -> bool {
        self.y + height <= self.page_height - self.footer_reserve
    }

    fn is_fresh_page(&self, content_top: Pt) -> bool {
        self.y <= content_top
    }

    fn break_page(&mut self, content_top: Pt) {
        self.page_index += 1;
        self.y = content_top;
        self.x = self.margin;
        self.column = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    Positioning,
    Overflow,
    PageBreakPending,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardPlacement {
    pub index: usize,
    /// Pages opened since placement started (0 = the page the grid began on).
    pub page_offset: usize,
    pub row: usize,
    pub column: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementStep {
    Card(CardPlacement),
    PageBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementPlan {
    pub columns: usize,
    pub card_width: Pt,
    pub steps: Vec<PlacementStep>,
    /// First free y on the last page after the grid.
    pub end_y: Pt,
    pub state: GridState,
}

impl PlacementPlan {
    pub fn cards(&self) -> impl Iterator<Item = &CardPlacement> {
        self.steps.iter().filter_map(|step| match step {
            PlacementStep::Card(card) => Some(card),
            PlacementStep::PageBreak => None,
        })
    }

    pub fn page_breaks(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, PlacementStep::PageBreak))
            .count()
    }

    pub fn pages_spanned(&self) -> usize {
        self.page_breaks() + 1
    }
}

/// Places `items` row by row starting at `start_y`, breaking pages before any row whose
/// bottom edge would cross `page_height - footer_reserve`.
///
/// A row that cannot fit even on a fresh page is placed anyway so placement always
/// terminates.
pub fn place_grid<T>(items: &[T], geometry: &GridGeometry, start_y: Pt) -> PlacementPlan {
    let columns = columns_for(items.len());
    let card_width = geometry.card_width(columns);
    let mut cursor = LayoutCursor::new(geometry, start_y);
    let mut steps = Vec::with_capacity(items.len() + 1);
    let mut state = GridState::Positioning;
    let mut row = 0usize;
    let mut index = 0usize;

    while index < items.len() {
        state = match state {
            GridState::Positioning => {
                if cursor.column == 0
                    && !cursor.fits(geometry.card_height)
                    && !cursor.is_fresh_page(geometry.content_top)
                {
                    GridState::Overflow
                } else {
                    steps.push(PlacementStep::Card(CardPlacement {
                        index,
                        page_offset: cursor.page_index,
                        row,
                        column: cursor.column,
                        rect: Rect::new(cursor.x, cursor.y, card_width, geometry.card_height),
                    }));
                    index += 1;
                    cursor.column += 1;
                    cursor.x += card_width + geometry.gap;
                    if cursor.column == columns {
                        cursor.column = 0;
                        cursor.x = geometry.margins.left;
                        cursor.y += geometry.card_height + geometry.gap;
                        row += 1;
                    }
                    GridState::Positioning
                }
            }
            GridState::Overflow => GridState::PageBreakPending,
            GridState::PageBreakPending => {
                steps.push(PlacementStep::PageBreak);
                cursor.break_page(geometry.content_top);
                row = 0;
                GridState::Positioning
            }
            GridState::Done => break,
        };
    }

    let end_y = if cursor.column > 0 {
        cursor.y + geometry.card_height + geometry.gap
    } else {
        cursor.y
    };

    PlacementPlan {
        columns,
        card_width,
        steps,
        end_y,
        state: GridState::Done,
    }
}

/// A full-width block: fixed chrome (title, padding) plus `lines` body lines that may be
/// split across pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackItem {
    pub chrome: Pt,
    pub line_height: Pt,
    pub lines: usize,
}

impl StackItem {
    pub fn new(chrome: Pt, line_height: Pt, lines: usize) -> Self {
        Self {
            chrome,
            line_height,
            lines,
        }
    }

    pub fn height_for(&self, lines: usize) -> Pt {
        self.chrome + self.line_height * lines as i32
    }

    pub fn height(&self) -> Pt {
        self.height_for(self.lines)
    }
}

/// Fewest body lines left on either side of a split.
pub const MIN_SPLIT_LINES: usize = 2;

/// One placed fragment of a stack item. An unsplit item is a single fragment covering
/// all of its lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackPlacement {
    pub index: usize,
    pub page_offset: usize,
    pub first_line: usize,
    pub line_count: usize,
    pub rect: Rect,
}

impl StackPlacement {
    pub fn is_continuation(&self) -> bool {
        self.first_line > 0
    }

    pub fn line_range(&self) -> std::ops::Range<usize> {
        self.first_line..self.first_line + self.line_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StackStep {
    Block(StackPlacement),
    PageBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackPlan {
    pub steps: Vec<StackStep>,
    pub end_y: Pt,
}

impl StackPlan {
    pub fn blocks(&self) -> impl Iterator<Item = &StackPlacement> {
        self.steps.iter().filter_map(|step| match step {
            StackStep::Block(block) => Some(block),
            StackStep::PageBreak => None,
        })
    }

    pub fn page_breaks(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, StackStep::PageBreak))
            .count()
    }
}

/// Full-width, variable-height variant of [`place_grid`] used for insight and
/// recommendation blocks.
///
/// An item that does not fit in the space left on a page is split between body lines,
/// keeping at least [`MIN_SPLIT_LINES`] on each side when it can. On a fresh page an
/// item always places at least one line so placement terminates.
pub fn place_stack(items: &[StackItem], geometry: &GridGeometry, start_y: Pt, gap: Pt) -> StackPlan {
    let width = geometry.content_width();
    let mut cursor = LayoutCursor::new(geometry, start_y);
    let mut steps = Vec::with_capacity(items.len() + 1);
    let mut state = GridState::Positioning;
    let mut index = 0usize;
    let mut first_line = 0usize;

    while index < items.len() {
        let item = items[index];
        let remaining = item.lines.saturating_sub(first_line);
        state = match state {
            GridState::Positioning => {
                let take = if cursor.fits(item.height_for(remaining)) {
                    Some(remaining)
                } else {
                    split_point(
                        &item,
                        remaining,
                        geometry.bottom_limit() - cursor.y,
                        cursor.is_fresh_page(geometry.content_top),
                    )
                };
                match take {
                    None => GridState::Overflow,
                    Some(take) => {
                        let height = item.height_for(take);
                        steps.push(StackStep::Block(StackPlacement {
                            index,
                            page_offset: cursor.page_index,
                            first_line,
                            line_count: take,
                            rect: Rect::new(cursor.x, cursor.y, width, height),
                        }));
                        cursor.y += height + gap;
                        first_line += take;
                        if first_line >= item.lines {
                            index += 1;
                            first_line = 0;
                            GridState::Positioning
                        } else {
                            GridState::Overflow
                        }
                    }
                }
            }
            GridState::Overflow => GridState::PageBreakPending,
            GridState::PageBreakPending => {
                steps.push(StackStep::PageBreak);
                cursor.break_page(geometry.content_top);
                GridState::Positioning
            }
            GridState::Done => break,
        };
    }

    StackPlan {
        steps,
        end_y: cursor.y,
    }
}

// Lines of `item` to place in `available` height when the remainder does not fit whole.
// `None` defers the item to the next page.
fn split_point(item: &StackItem, remaining: usize, available: Pt, fresh: bool) -> Option<usize> {
    let room = (available - item.chrome).to_milli_i64();
    let line = item.line_height.to_milli_i64();
    let fit = if room <= 0 || line <= 0 {
        0
    } else {
        ((room / line) as usize).min(remaining)
    };
    let floor = MIN_SPLIT_LINES.min(remaining).max(1);
    if !fresh && fit < floor {
        return None;
    }
    let mut take = fit.max(1).min(remaining);
    let tail = remaining - take;
    if tail > 0 && tail < MIN_SPLIT_LINES {
        let adjusted = remaining.saturating_sub(MIN_SPLIT_LINES);
        if adjusted >= floor {
            take = adjusted;
        } else if !fresh {
            return None;
        }
    }
    Some(take)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4_geometry() -> GridGeometry {
        GridGeometry {
            page_size: Size::a4(),
            margins: Margins::all(50.0),
            card_height: Pt::from_i32(80),
            gap: Pt::from_i32(15),
            content_top: Pt::from_i32(110),
            footer_reserve: Pt::from_i32(60),
        }
    }

    #[test]
    fn column_boundaries() {
        assert_eq!(columns_for(1), 2);
        assert_eq!(columns_for(4), 2);
        assert_eq!(columns_for(5), 3);
        assert_eq!(columns_for(9), 3);
        assert_eq!(columns_for(10), 4);
        assert_eq!(columns_for(15), 4);
    }

    #[test]
    fn plan_columns_follow_item_count() {
        let geometry = a4_geometry();
        for (count, expected) in [(4, 2), (5, 3), (9, 3), (10, 4)] {
            let items = vec![(); count];
            let plan = place_grid(&items, &geometry, geometry.content_top);
            assert_eq!(plan.columns, expected, "count {count}");
            assert_eq!(plan.cards().count(), count);
            assert_eq!(plan.page_breaks(), 0);
        }
    }

    #[test]
    fn cards_fill_rows_left_to_right() {
        let geometry = a4_geometry();
        let plan = place_grid(&[1, 2, 3], &geometry, geometry.content_top);
        let cards: Vec<_> = plan.cards().copied().collect();
        // (595.28 - 100 - 15) / 2
        assert_eq!(plan.card_width.to_milli_i64(), 240_140);
        assert_eq!((cards[0].row, cards[0].column), (0, 0));
        assert_eq!((cards[1].row, cards[1].column), (0, 1));
        assert_eq!((cards[2].row, cards[2].column), (1, 0));
        assert_eq!(cards[1].rect.x, geometry.margins.left + plan.card_width + geometry.gap);
        assert_eq!(cards[2].rect.y, Pt::from_i32(110 + 95));
        assert_eq!(plan.end_y, Pt::from_i32(110 + 95 * 2));
        assert_eq!(plan.state, GridState::Done);
    }

    #[test]
    fn overflow_breaks_before_the_row_that_does_not_fit() {
        let geometry = a4_geometry();
        // Seven rows of four fit between y=110 and 781.89.
        let items = vec![(); 30];
        let plan = place_grid(&items, &geometry, geometry.content_top);
        assert_eq!(plan.page_breaks(), 1);
        assert!(matches!(plan.steps[28], PlacementStep::PageBreak));
        let cards: Vec<_> = plan.cards().copied().collect();
        assert_eq!(cards[27].page_offset, 0);
        assert_eq!(cards[28].page_offset, 1);
        assert_eq!(cards[28].rect.y, geometry.content_top);
        assert_eq!((cards[28].row, cards[28].column), (0, 0));
        for card in &cards {
            assert!(card.rect.bottom() <= geometry.bottom_limit());
        }
    }

    #[test]
    fn grid_starting_low_on_a_page_moves_to_the_next_one() {
        let geometry = a4_geometry();
        let plan = place_grid(&[(); 2], &geometry, Pt::from_i32(750));
        assert!(matches!(plan.steps[0], PlacementStep::PageBreak));
        assert_eq!(plan.pages_spanned(), 2);
    }

    #[test]
    fn oversized_cards_are_placed_on_a_fresh_page() {
        let mut geometry = a4_geometry();
        geometry.card_height = Pt::from_i32(2000);
        let plan = place_grid(&[(); 3], &geometry, geometry.content_top);
        // Row one is forced onto the first page, row two onto the second.
        assert_eq!(plan.cards().count(), 3);
        assert_eq!(plan.page_breaks(), 1);
    }

    #[test]
    fn empty_grid_places_nothing() {
        let geometry = a4_geometry();
        let items: [u8; 0] = [];
        let plan = place_grid(&items, &geometry, Pt::from_i32(200));
        assert!(plan.steps.is_empty());
        assert_eq!(plan.end_y, Pt::from_i32(200));
    }

    fn block(lines: usize) -> StackItem {
        StackItem::new(Pt::from_i32(48), Pt::from_i32(14), lines)
    }

    #[test]
    fn stack_breaks_on_analytic_overflow() {
        let geometry = a4_geometry();
        // 48 + 18 * 14 = 300 each.
        let items = vec![block(18); 4];
        let plan = place_stack(&items, &geometry, geometry.content_top, Pt::from_i32(10));
        // 110 + 300 + 10 + 300 = 720; the third block has no room for two lines.
        assert_eq!(plan.page_breaks(), 1);
        let blocks: Vec<_> = plan.blocks().copied().collect();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[1].page_offset, 0);
        assert_eq!(blocks[2].page_offset, 1);
        assert_eq!(blocks[2].rect.y, geometry.content_top);
        assert!(!blocks[2].is_continuation());
        assert_eq!(blocks[0].rect.width, geometry.content_width());
    }

    #[test]
    fn block_taller_than_a_page_is_split_by_lines() {
        let geometry = a4_geometry();
        let plan = place_stack(&[block(100)], &geometry, geometry.content_top, Pt::from_i32(12));
        let fragments: Vec<_> = plan.blocks().copied().collect();
        // (781.89 - 110 - 48) / 14 = 44 lines per fresh page.
        assert_eq!(
            fragments.iter().map(|f| f.line_count).collect::<Vec<_>>(),
            vec![44, 44, 12]
        );
        assert_eq!(plan.page_breaks(), 2);
        assert_eq!(fragments[1].line_range(), 44..88);
        assert!(fragments[1].is_continuation());
        for fragment in &fragments {
            assert_eq!(fragment.index, 0);
            assert!(fragment.rect.bottom() <= geometry.bottom_limit());
        }
    }

    #[test]
    fn block_starting_mid_page_splits_into_the_remaining_space() {
        let geometry = a4_geometry();
        // First block ends at 110 + 468 = 578; the second starts at 590 with room for
        // (781.89 - 590 - 48) / 14 = 10 lines.
        let plan = place_stack(&[block(30), block(20)], &geometry, geometry.content_top, Pt::from_i32(12));
        let fragments: Vec<_> = plan.blocks().copied().collect();
        assert_eq!(fragments.len(), 3);
        assert_eq!((fragments[1].index, fragments[1].page_offset, fragments[1].line_count), (1, 0, 10));
        assert_eq!((fragments[2].index, fragments[2].page_offset, fragments[2].line_range()), (1, 1, 10..20));
    }

    #[test]
    fn splits_never_leave_a_single_line_behind() {
        let geometry = a4_geometry();
        // 45 lines on a fresh page: 44 fit, which would strand one line.
        let plan = place_stack(&[block(45)], &geometry, geometry.content_top, Pt::ZERO);
        let counts: Vec<_> = plan.blocks().map(|f| f.line_count).collect();
        assert_eq!(counts, vec![43, 2]);

        // Three lines with room for two would also strand one, so the block moves.
        let plan = place_stack(&[block(3)], &geometry, Pt::from_i32(700), Pt::ZERO);
        assert!(matches!(plan.steps[0], StackStep::PageBreak));
        assert_eq!(plan.blocks().map(|f| f.line_count).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn plans_are_deterministic() {
        let geometry = a4_geometry();
        let items = vec![(); 13];
        assert_eq!(
            place_grid(&items, &geometry, Pt::from_i32(300)),
            place_grid(&items, &geometry, Pt::from_i32(300))
        );
    }
}
