//! Line-based display output.
//!
//! Each visible line is drawn from a decision taken from the chipset
//! registers at hsync (resolution, plane count, first colours). Decisions
//! are cached per line and a line is only redrawn when its decision
//! changes. Lores lines cover the left half of the framebuffer; whatever
//! a previous hires line left in the right half stays there until the
//! display is invalidated.

use crate::config::{Chipset, Region};
use crate::custom::{BEAMCON0, BPLCON0, CustomRegs, DMAF_RASTER};
use crate::palette::{AgaPalette, expand_rgb12};

pub const FB_WIDTH: usize = 640;
pub const FB_HEIGHT: usize = 256;
const LORES_WIDTH: usize = 320;
/// First beam line shown in the framebuffer.
pub const FIRST_VISIBLE_LINE: u16 = 0x2C;

/// BEAMCON0 bit 5: PAL timing on ECS Agnus.
const BEAMCON0_PAL: u16 = 0x0020;
const BPLCON0_HIRES: u16 = 0x8000;

/// What one line looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineDecision {
    pub hires: bool,
    pub planes: u8,
    pub colors: [u32; 8],
}

pub struct Video {
    framebuffer: Vec<u32>,
    decisions: Vec<Option<LineDecision>>,
    lines_per_frame: u16,
    redrawn: u64,
}

impl Video {
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            framebuffer: vec![0; FB_WIDTH * FB_HEIGHT],
            decisions: vec![None; FB_HEIGHT],
            lines_per_frame: region.lines_per_frame(),
            redrawn: 0,
        }
    }

    /// Derive frame timing from the chipset registers. ECS and AGA select
    /// PAL/NTSC through BEAMCON0; OCS is fixed by the crystal.
    pub fn reinit_timing(&mut self, regs: &CustomRegs, region: Region) {
        let region = if regs.chipset().is_ecs_or_aga() {
            if regs.get(BEAMCON0) & BEAMCON0_PAL != 0 {
                Region::Pal
            } else {
                Region::Ntsc
            }
        } else {
            region
        };
        self.lines_per_frame = region.lines_per_frame();
    }

    /// Clear the picture and forget every cached decision.
    pub fn invalidate(&mut self) {
        self.framebuffer.fill(0);
        self.decisions.fill(None);
    }

    /// Take the decision for beam line `vpos` and draw it if it changed.
    pub fn hsync(&mut self, vpos: u16, regs: &CustomRegs, palette: &AgaPalette) {
        let Some(y) = vpos
            .checked_sub(FIRST_VISIBLE_LINE)
            .map(usize::from)
            .filter(|&y| y < FB_HEIGHT)
        else {
            return;
        };
        let decision = decide(regs, palette);
        if self.decisions[y] == Some(decision) {
            return;
        }
        self.draw(y, &decision);
        self.decisions[y] = Some(decision);
        self.redrawn += 1;
    }

    fn draw(&mut self, y: usize, decision: &LineDecision) {
        let width = if decision.hires { FB_WIDTH } else { LORES_WIDTH };
        let colours = 1usize << decision.planes.min(3);
        let row = &mut self.framebuffer[y * FB_WIDTH..y * FB_WIDTH + width];
        for (x, px) in row.iter_mut().enumerate() {
            // Vertical bars, 16 pixels per colour.
            *px = decision.colors[(x / 16) % colours];
        }
    }

    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    #[must_use]
    pub fn line(&self, y: usize) -> &[u32] {
        &self.framebuffer[y * FB_WIDTH..(y + 1) * FB_WIDTH]
    }

    #[must_use]
    pub fn decision(&self, y: usize) -> Option<LineDecision> {
        self.decisions.get(y).copied().flatten()
    }

    #[must_use]
    pub fn lines_per_frame(&self) -> u16 {
        self.lines_per_frame
    }

    /// Lines drawn since power-on.
    #[must_use]
    pub fn redrawn_lines(&self) -> u64 {
        self.redrawn
    }
}

fn decide(regs: &CustomRegs, palette: &AgaPalette) -> LineDecision {
    let bplcon0 = regs.get(BPLCON0);
    let planes = if regs.dma_enabled(DMAF_RASTER) {
        ((bplcon0 >> 12) & 7) as u8
    } else {
        0
    };
    let mut colors = [0; 8];
    for (i, c) in colors.iter_mut().enumerate() {
        *c = if regs.chipset() == Chipset::Aga {
            palette.colors[i]
        } else {
            expand_rgb12(regs.color(i))
        };
    }
    LineDecision {
        hires: bplcon0 & BPLCON0_HIRES != 0,
        planes,
        colors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::{COLOR00, DMACON, DMAF_MASTER, DMAF_SETCLR};

    fn regs(bplcon0: u16) -> CustomRegs {
        let mut regs = CustomRegs::new(Chipset::Ocs);
        regs.write(DMACON, DMAF_SETCLR | DMAF_MASTER | DMAF_RASTER);
        regs.write(BPLCON0, bplcon0);
        regs.write(COLOR00, 0x0111);
        regs.write(COLOR00 + 2, 0x0F00);
        regs
    }

    #[test]
    fn unchanged_line_is_not_redrawn() {
        let mut video = Video::new(Region::Pal);
        let palette = AgaPalette::new();
        let r = regs(0x1200);
        video.hsync(FIRST_VISIBLE_LINE, &r, &palette);
        video.hsync(FIRST_VISIBLE_LINE, &r, &palette);
        assert_eq!(video.redrawn_lines(), 1);
        assert_eq!(video.line(0)[0], 0x0011_1111);
        assert_eq!(video.line(0)[16], 0x00FF_0000);
    }

    #[test]
    fn lines_outside_window_are_ignored() {
        let mut video = Video::new(Region::Pal);
        video.hsync(10, &regs(0x1200), &AgaPalette::new());
        video.hsync(FIRST_VISIBLE_LINE + 256, &regs(0x1200), &AgaPalette::new());
        assert_eq!(video.redrawn_lines(), 0);
    }

    #[test]
    fn lores_leaves_right_half_until_invalidated() {
        let mut video = Video::new(Region::Pal);
        let palette = AgaPalette::new();
        video.hsync(FIRST_VISIBLE_LINE, &regs(0x9200), &palette);
        video.hsync(FIRST_VISIBLE_LINE, &regs(0x1200), &palette);
        assert_ne!(video.line(0)[LORES_WIDTH], 0, "stale hires pixels");

        video.invalidate();
        assert!(video.decision(0).is_none());
        video.hsync(FIRST_VISIBLE_LINE, &regs(0x1200), &palette);
        assert!(video.line(0)[LORES_WIDTH..].iter().all(|&p| p == 0));
    }

    #[test]
    fn ecs_timing_follows_beamcon0() {
        let mut video = Video::new(Region::Pal);
        let mut r = CustomRegs::new(Chipset::Ecs);
        video.reinit_timing(&r, Region::Pal);
        assert_eq!(video.lines_per_frame(), 263);
        r.write(BEAMCON0, BEAMCON0_PAL);
        video.reinit_timing(&r, Region::Ntsc);
        assert_eq!(video.lines_per_frame(), 313);

        let ocs = CustomRegs::new(Chipset::Ocs);
        video.reinit_timing(&ocs, Region::Ntsc);
        assert_eq!(video.lines_per_frame(), 263);
    }
}
