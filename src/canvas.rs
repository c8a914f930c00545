//! The external render-method trait and its concrete software
//! implementation (spec.md §6 "External interfaces").
//!
//! No teacher analogue — `larsbrubaker-agg-rust` leaves target/surface
//! wiring to its own example binaries rather than defining a trait for
//! it. Grounded directly on spec.md §6's method list and on
//! `original_source/src/lib/sw_engine/tvgSwCanvas.cpp`'s
//! target/sync/prepare/render call sequence for ordering.

use crate::color::{self, ColorSpace};
use crate::compositor::image::Transform;
use crate::compositor::{self, CompositeMethod, Compositor, Image, Surface};
use crate::error::{Error, Result};
use crate::outline::Outline;
use crate::rle::{IntRect, RleData, Span};
use crate::stroke::Stroke;
use crate::task::{self, ClipSource, Engine, Fill, Task, UpdateFlags};

/// A render region (spec.md §6 `region(task) -> RenderRegion`):
/// the task's last-computed fill+stroke bounding box, already
/// clipped to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRegion {
    pub bbox: IntRect,
}

/// A shape's paint data, bundled the way spec.md §6's `prepare(shape,
/// data, ...)` passes fill and stroke alongside the geometry.
#[derive(Debug, Clone, Default)]
pub struct ShapeData {
    pub fill: Fill,
    pub stroke: Option<Stroke>,
    pub stroke_color: u32,
}

/// The render-method trait spec.md §6 describes, consumed by an outer
/// (UI-owned) canvas. One `prepare`/`dispose`/render cycle per task;
/// `target`/`viewport`/`sync`/`clear` operate on the whole surface.
pub trait Canvas {
    fn prepare_shape(
        &mut self,
        path: Outline,
        data: ShapeData,
        transform: Transform,
        opacity: u8,
        clips: Vec<ClipSource>,
        flags: UpdateFlags,
    ) -> usize;

    fn dispose(&mut self, task_id: usize);

    fn pre_render(&mut self);
    fn render_shape(&mut self, task_id: usize) -> Result<()>;
    fn render_image(&mut self, task_id: usize, image: &Image) -> Result<()>;
    fn post_render(&mut self);

    fn begin_composite(&mut self, bbox: IntRect, method: CompositeMethod) -> Result<()>;
    fn end_composite(&mut self) -> Result<()>;

    /// # Safety
    /// `buffer` must point to at least `stride * h` valid `u32`s, kept
    /// alive for as long as this canvas targets it.
    unsafe fn target(&mut self, buffer: *mut u32, stride: u32, w: u32, h: u32, colorspace: ColorSpace) -> Result<()>;

    fn viewport(&self) -> IntRect;
    fn set_viewport(&mut self, region: IntRect) -> Result<()>;

    fn sync(&mut self) -> Result<()>;
    fn clear(&mut self) -> Result<()>;

    fn region(&self, task_id: usize) -> Option<RenderRegion>;
}

/// Concrete software-rasterizer canvas. Owns the [`Engine`] handle, the
/// task list, and (once attached) the output [`Surface`].
pub struct SwCanvas {
    engine: Engine,
    tid: usize,
    tasks: Vec<Option<Task>>,
    surface: Option<Surface>,
    viewport: IntRect,
    /// Set once a draw starts and cleared by `sync`; mirrors spec.md
    /// §7's "draws requested while a previous draw is not synced"
    /// `InsufficientCondition`.
    dirty: bool,
}

impl SwCanvas {
    pub fn new(threads: usize, tid: usize) -> Self {
        Self {
            engine: Engine::init(threads),
            tid,
            tasks: Vec::new(),
            surface: None,
            viewport: IntRect { x1: 0, y1: 0, x2: 0, y2: 0 },
            dirty: false,
        }
    }

    fn surface_mut(&mut self) -> Result<&mut Surface> {
        self.surface
            .as_mut()
            .ok_or_else(|| Error::InsufficientCondition("no target attached".into()))
    }

    fn task_mut(&mut self, task_id: usize) -> Result<&mut Task> {
        self.tasks
            .get_mut(task_id)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| Error::InvalidArguments(format!("no such task {task_id}")))
    }
}

impl Canvas for SwCanvas {
    fn prepare_shape(
        &mut self,
        path: Outline,
        data: ShapeData,
        transform: Transform,
        opacity: u8,
        clips: Vec<ClipSource>,
        flags: UpdateFlags,
    ) -> usize {
        let mut t = Task::prepare_shape(path, transform, opacity, clips, flags);
        t.fill = data.fill;
        t.stroke = data.stroke;
        t.stroke_color = data.stroke_color;
        if let Some(surface) = &self.surface {
            t.colorspace = surface.colorspace;
        }
        self.tasks.push(Some(t));
        self.tasks.len() - 1
    }

    fn dispose(&mut self, task_id: usize) {
        if let Some(slot) = self.tasks.get_mut(task_id) {
            *slot = None;
        }
    }

    fn pre_render(&mut self) {
        self.dirty = true;
    }

    fn render_shape(&mut self, task_id: usize) -> Result<()> {
        let viewport = self.viewport;
        let colorspace = self.surface_mut()?.colorspace;
        let tid = self.tid;
        let engine = self.engine.clone();
        let task = self.task_mut(task_id)?;
        task.colorspace = colorspace;
        task::run_shape_task(task, &engine, tid, viewport);
        if !task.visible {
            return Ok(());
        }

        let surface = self.surface.as_mut().unwrap();
        let (mask, mask_bbox, method) = match &surface.compositor {
            Some(c) => (Some(c.mask.pixels.clone()), c.bbox, c.method),
            None => (None, IntRect { x1: 0, y1: 0, x2: 0, y2: 0 }, CompositeMethod::None),
        };

        let task = self.tasks[task_id].as_ref().unwrap();
        let valid_stroke = task.stroke.is_some() && color::alpha(task.stroke_color) > 0;

        // Rect fast-track (spec.md §4.7): bypasses RLE entirely for an
        // orthogonal, unstroked, unmasked rect. `fast_rect` is purely
        // geometric, so the stroke/clip/mask conditions are checked
        // fresh here rather than baked into it.
        if !valid_stroke && task.clips.is_empty() && mask.is_none() {
            if let (Some(rect), Fill::Solid(c)) = (task.fast_rect, &task.fill) {
                if task.opacity == 255 {
                    compositor::composite_rect_opaque(surface, rect, *c);
                } else {
                    compositor::composite_rect_blend(surface, rect, compositor::alpha_blend(*c, task.opacity));
                }
                return Ok(());
            }
        }

        if task.cmp_stroking {
            composite_group(surface, task, mask.as_deref(), mask_bbox, method);
            return Ok(());
        }

        paint_fill(surface, &task.shape_rle, &task.fill, task.opacity, mask.as_deref(), mask_bbox, method);
        if valid_stroke {
            let stroke_color = if task.opacity == 255 {
                task.stroke_color
            } else {
                compositor::alpha_blend(task.stroke_color, task.opacity)
            };
            paint_solid(surface, &task.stroke_rle, stroke_color, mask.as_deref(), mask_bbox, method);
        }
        Ok(())
    }

    fn render_image(&mut self, task_id: usize, image: &Image) -> Result<()> {
        let viewport = self.viewport;
        let tid = self.tid;
        let engine = self.engine.clone();
        let task = self.task_mut(task_id)?;
        if !task.transform.is_affine() {
            return Err(Error::InvalidArguments(format!(
                "task {task_id}: image transform's third row must be (0, 0, 1)"
            )));
        }
        task::run_image_task(task, &engine, tid, viewport, (image.w as i32) * 64, (image.h as i32) * 64);
        if !task.visible {
            return Ok(());
        }

        let Some(inv) = task.transform.invert() else {
            log::warn!("canvas: singular image transform, dropping draw for task {task_id}");
            return Ok(());
        };

        let surface = self.surface.as_mut().unwrap();
        let cs = surface.colorspace;
        let bbox = task.bbox;
        for y in bbox.y1..bbox.y2 {
            let row = unsafe { surface.row_mut(y as u32) };
            for x in bbox.x1..bbox.x2 {
                let src = crate::compositor::image::sample(image, cs, &inv, x, y);
                let dst = &mut row[x as usize];
                *dst = compositor::source_over(*dst, src);
            }
        }
        Ok(())
    }

    fn post_render(&mut self) {}

    fn begin_composite(&mut self, bbox: IntRect, method: CompositeMethod) -> Result<()> {
        let surface = self.surface_mut()?;
        let mut cmp = Compositor::new(bbox, method);
        cmp.valid = true;
        surface.compositor = Some(cmp);
        Ok(())
    }

    fn end_composite(&mut self) -> Result<()> {
        let surface = self.surface_mut()?;
        surface.compositor = None;
        Ok(())
    }

    unsafe fn target(&mut self, buffer: *mut u32, stride: u32, w: u32, h: u32, colorspace: ColorSpace) -> Result<()> {
        if buffer.is_null() || w == 0 || h == 0 {
            return Err(Error::InvalidArguments("null buffer or zero dimensions".into()));
        }
        if self.dirty {
            return Err(Error::InsufficientCondition("previous draw not synced".into()));
        }
        self.surface = Some(Surface {
            buffer,
            w,
            h,
            stride,
            colorspace,
            compositor: None,
        });
        self.viewport = IntRect { x1: 0, y1: 0, x2: w as i32, y2: h as i32 };
        Ok(())
    }

    fn viewport(&self) -> IntRect {
        self.viewport
    }

    fn set_viewport(&mut self, region: IntRect) -> Result<()> {
        let Some(surface) = &self.surface else {
            return Err(Error::InsufficientCondition("no target attached".into()));
        };
        let bounds = surface.region();
        self.viewport = IntRect {
            x1: region.x1.max(bounds.x1),
            y1: region.y1.max(bounds.y1),
            x2: region.x2.min(bounds.x2),
            y2: region.y2.min(bounds.y2),
        };
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let surface = self.surface_mut()?;
        if surface.colorspace.is_straight() {
            let region = surface.region();
            for y in region.y1..region.y2 {
                let row = unsafe { surface.row_mut(y as u32) };
                color::unpremultiply_buffer(surface.colorspace, row);
            }
        }
        self.dirty = false;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let surface = self.surface_mut()?;
        let region = surface.region();
        for y in region.y1..region.y2 {
            let row = unsafe { surface.row_mut(y as u32) };
            row.fill(0);
        }
        Ok(())
    }

    fn region(&self, task_id: usize) -> Option<RenderRegion> {
        self.tasks.get(task_id)?.as_ref().map(|t| RenderRegion { bbox: t.bbox })
    }
}

/// Composite one task's fill RLE, dispatching solid vs. per-pixel
/// gradient fetch. `opacity` scales a solid color before blending;
/// `Linear`/`Radial` fills already have their opacity baked into
/// `table` by `Fill::rebuild_table`, so it isn't reapplied here.
fn paint_fill(surface: &mut Surface, rle: &RleData, fill: &Fill, opacity: u8, mask: Option<&[u32]>, mask_bbox: IntRect, method: CompositeMethod) {
    match fill {
        Fill::None => {}
        Fill::Solid(c) => {
            let color = if opacity == 255 { *c } else { compositor::alpha_blend(*c, opacity) };
            paint_solid(surface, rle, color, mask, mask_bbox, method);
        }
        Fill::Linear { fill, table, .. } => {
            let fill = *fill;
            composite_masked(surface, rle, mask, mask_bbox, method, |x, y| {
                let mut dst = [0u32; 1];
                crate::gradient::fetch_linear(&fill, table, &mut dst, x, y);
                dst[0]
            });
        }
        Fill::Radial { fill, table, .. } => {
            let fill = *fill;
            composite_masked(surface, rle, mask, mask_bbox, method, |x, y| {
                let mut dst = [0u32; 1];
                crate::gradient::fetch_radial(&fill, table, &mut dst, x, y);
                dst[0]
            });
        }
    }
}

fn paint_solid(surface: &mut Surface, rle: &RleData, color: u32, mask: Option<&[u32]>, mask_bbox: IntRect, method: CompositeMethod) {
    composite_masked(surface, rle, mask, mask_bbox, method, |_x, _y| color);
}

/// Composite `rle` against `surface`, sampling each pixel's source
/// color via `fetch` and, when a mask is active, blending through
/// [`compositor::masked_source_over`] instead of plain
/// [`compositor::source_over`].
fn composite_masked(
    surface: &mut Surface,
    rle: &RleData,
    mask: Option<&[u32]>,
    mask_bbox: IntRect,
    method: CompositeMethod,
    mut fetch: impl FnMut(i32, i32) -> u32,
) {
    let mask_w = mask_bbox.width();
    for span in &rle.spans {
        let row = unsafe { surface.row_mut(span.y as u32) };
        for i in 0..span.len as i32 {
            let x = span.x as i32 + i;
            let raw = fetch(x, span.y as i32);
            let src = if span.coverage == 255 { raw } else { compositor::alpha_blend(raw, span.coverage) };
            let dst = &mut row[x as usize];
            *dst = match mask {
                Some(buf) => {
                    let mx = x - mask_bbox.x1;
                    let my = span.y as i32 - mask_bbox.y1;
                    let idx = my as usize * mask_w as usize + mx as usize;
                    let mpixel = if mx >= 0 && my >= 0 && mx < mask_w && idx < buf.len() {
                        buf[idx]
                    } else {
                        0
                    };
                    compositor::masked_source_over(*dst, src, mpixel, method)
                }
                None => compositor::source_over(*dst, src),
            };
        }
    }
}

/// Translate an RLE's spans so `(origin_x, origin_y)` becomes the new
/// `(0, 0)` — used to re-home a task's shape/stroke RLE onto an
/// offscreen, bbox-sized group buffer in [`composite_group`].
fn shift_rle(rle: &RleData, origin_x: i32, origin_y: i32) -> RleData {
    RleData {
        spans: rle
            .spans
            .iter()
            .map(|s| Span {
                x: (s.x as i32 - origin_x) as i16,
                y: (s.y as i32 - origin_y) as i16,
                len: s.len,
                coverage: s.coverage,
            })
            .collect(),
    }
}

/// Render a task's fill and stroke into an offscreen, bbox-sized group
/// at full opacity, then blend that group onto `surface` once at
/// `task.opacity` (spec.md §4.8: with both a visible fill and a valid
/// stroke, blending each separately at a translucent opacity would
/// double-blend their overlapping region).
fn composite_group(surface: &mut Surface, task: &Task, mask: Option<&[u32]>, mask_bbox: IntRect, method: CompositeMethod) {
    let bbox = task.bbox;
    let w = bbox.width();
    let h = bbox.height();
    if w <= 0 || h <= 0 {
        return;
    }

    let mut group = vec![0u32; w as usize * h as usize];
    {
        let mut group_surface = Surface {
            buffer: group.as_mut_ptr(),
            w: w as u32,
            h: h as u32,
            stride: w as u32,
            colorspace: task.colorspace,
            compositor: None,
        };
        let no_mask_bbox = IntRect { x1: 0, y1: 0, x2: 0, y2: 0 };
        let shape_rle = shift_rle(&task.shape_rle, bbox.x1, bbox.y1);
        paint_fill(&mut group_surface, &shape_rle, &task.fill, 255, None, no_mask_bbox, CompositeMethod::None);
        if task.stroke.is_some() {
            let stroke_rle = shift_rle(&task.stroke_rle, bbox.x1, bbox.y1);
            paint_solid(&mut group_surface, &stroke_rle, task.stroke_color, None, no_mask_bbox, CompositeMethod::None);
        }
    }

    let mask_w = mask_bbox.width();
    for y in bbox.y1..bbox.y2 {
        let row = unsafe { surface.row_mut(y as u32) };
        let gy = (y - bbox.y1) as usize;
        for x in bbox.x1..bbox.x2 {
            let gx = (x - bbox.x1) as usize;
            let group_pixel = group[gy * w as usize + gx];
            if group_pixel == 0 {
                continue;
            }
            let src = compositor::alpha_blend(group_pixel, task.opacity);
            let dst = &mut row[x as usize];
            *dst = match mask {
                Some(buf) => {
                    let mx = x - mask_bbox.x1;
                    let my = y - mask_bbox.y1;
                    let idx = my as usize * mask_w as usize + mx as usize;
                    let mpixel = if mx >= 0 && my >= 0 && mx < mask_w && idx < buf.len() {
                        buf[idx]
                    } else {
                        0
                    };
                    compositor::masked_source_over(*dst, src, mpixel, method)
                }
                None => compositor::source_over(*dst, src),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Point;

    fn square_path() -> Outline {
        let mut o = Outline::new();
        o.move_to(Point::new(0, 0));
        o.line_to(Point::new(640, 0));
        o.line_to(Point::new(640, 640));
        o.line_to(Point::new(0, 640));
        o.close();
        o
    }

    #[test]
    fn target_rejects_null_buffer() {
        let mut canvas = SwCanvas::new(1, 0);
        let err = unsafe { canvas.target(core::ptr::null_mut(), 0, 0, 0, ColorSpace::Abgr8888) };
        assert!(err.is_err());
    }

    #[test]
    fn render_without_target_is_insufficient_condition() {
        let mut canvas = SwCanvas::new(1, 0);
        let tid = canvas.prepare_shape(square_path(), ShapeData::default(), Transform::identity(), 255, vec![], UpdateFlags::PATH);
        let err = canvas.render_shape(tid);
        assert!(matches!(err, Err(Error::InsufficientCondition(_))));
    }

    #[test]
    fn solid_fill_draws_into_target_buffer() {
        let mut buf = vec![0u32; 16 * 16];
        let mut canvas = SwCanvas::new(1, 0);
        unsafe {
            canvas.target(buf.as_mut_ptr(), 16, 16, 16, ColorSpace::Abgr8888).unwrap();
        }
        let mut path = Outline::new();
        path.move_to(Point::new(0, 0));
        path.line_to(Point::new(16 * 64, 0));
        path.line_to(Point::new(16 * 64, 16 * 64));
        path.line_to(Point::new(0, 16 * 64));
        path.close();
        let data = ShapeData {
            fill: Fill::Solid(color::join(ColorSpace::Abgr8888, 255, 0, 0, 255)),
            stroke: None,
            stroke_color: 0,
        };
        let tid = canvas.prepare_shape(path, data, Transform::identity(), 255, vec![], UpdateFlags::PATH);
        canvas.pre_render();
        canvas.render_shape(tid).unwrap();
        canvas.post_render();
        canvas.sync().unwrap();
        assert_eq!(buf[0], color::join(ColorSpace::Abgr8888, 255, 0, 0, 255));
    }

    #[test]
    fn translucent_solid_fill_is_scaled_by_opacity() {
        let mut buf = vec![0u32; 16 * 16];
        let mut canvas = SwCanvas::new(1, 0);
        unsafe {
            canvas.target(buf.as_mut_ptr(), 16, 16, 16, ColorSpace::Abgr8888).unwrap();
        }
        // A triangle, not a rect, so this exercises the ordinary
        // paint_fill path rather than the rect fast-track.
        let mut path = Outline::new();
        path.move_to(Point::new(0, 0));
        path.line_to(Point::new(16 * 64, 0));
        path.line_to(Point::new(0, 16 * 64));
        path.close();
        let color = color::join(ColorSpace::Abgr8888, 255, 0, 0, 255);
        let data = ShapeData { fill: Fill::Solid(color), stroke: None, stroke_color: 0 };
        let tid = canvas.prepare_shape(path, data, Transform::identity(), 128, vec![], UpdateFlags::PATH);
        canvas.pre_render();
        canvas.render_shape(tid).unwrap();
        canvas.post_render();
        canvas.sync().unwrap();
        let idx = 1 * 16 + 1;
        assert_eq!(buf[idx], compositor::alpha_blend(color, 128));
    }

    #[test]
    fn cmp_stroking_blends_fill_and_stroke_as_one_group() {
        let mut buf = vec![0u32; 16 * 16];
        let mut canvas = SwCanvas::new(1, 0);
        unsafe {
            canvas.target(buf.as_mut_ptr(), 16, 16, 16, ColorSpace::Abgr8888).unwrap();
        }
        let mut path = Outline::new();
        path.move_to(Point::new(4 * 64, 4 * 64));
        path.line_to(Point::new(12 * 64, 4 * 64));
        path.line_to(Point::new(12 * 64, 12 * 64));
        path.line_to(Point::new(4 * 64, 12 * 64));
        path.close();
        let fill_color = color::join(ColorSpace::Abgr8888, 255, 0, 0, 255);
        let stroke_color = color::join(ColorSpace::Abgr8888, 0, 255, 0, 255);
        let data = ShapeData {
            fill: Fill::Solid(fill_color),
            stroke: Some(Stroke::new(64, crate::stroke::LineCap::Butt, crate::stroke::LineJoin::Miter).unwrap()),
            stroke_color,
        };
        let tid = canvas.prepare_shape(path, data, Transform::identity(), 128, vec![], UpdateFlags::PATH | UpdateFlags::STROKE);
        canvas.pre_render();
        canvas.render_shape(tid).unwrap();
        canvas.post_render();
        canvas.sync().unwrap();
        // The fill's interior pixel should be translucent red, not
        // full-opacity red blended twice with the stroke.
        let idx = 8 * 16 + 8;
        assert_eq!(color::alpha(buf[idx]), 128);
    }

    #[test]
    fn disposed_task_is_no_longer_addressable() {
        let mut canvas = SwCanvas::new(1, 0);
        let tid = canvas.prepare_shape(square_path(), ShapeData::default(), Transform::identity(), 255, vec![], UpdateFlags::PATH);
        canvas.dispose(tid);
        assert!(canvas.region(tid).is_none());
    }

    #[test]
    fn render_image_rejects_non_affine_transform() {
        let mut buf = vec![0u32; 16 * 16];
        let mut canvas = SwCanvas::new(1, 0);
        unsafe {
            canvas.target(buf.as_mut_ptr(), 16, 16, 16, ColorSpace::Abgr8888).unwrap();
        }
        let mut perspective = Transform::identity();
        perspective.m31 = 0.01;
        let tid = canvas.prepare_shape(square_path(), ShapeData::default(), perspective, 255, vec![], UpdateFlags::PATH);
        let image = Image::new(4, 4);
        let err = canvas.render_image(tid, &image);
        assert!(matches!(err, Err(Error::InvalidArguments(_))));
    }

    #[test]
    fn viewport_clamps_to_surface_bounds() {
        let mut buf = vec![0u32; 4 * 4];
        let mut canvas = SwCanvas::new(1, 0);
        unsafe {
            canvas.target(buf.as_mut_ptr(), 4, 4, 4, ColorSpace::Abgr8888).unwrap();
        }
        canvas.set_viewport(IntRect { x1: -10, y1: -10, x2: 100, y2: 100 }).unwrap();
        assert_eq!(canvas.viewport(), IntRect { x1: 0, y1: 0, x2: 4, y2: 4 });
    }
}
