//! End-to-end scenarios driving a 16x16 [`SwCanvas`] surface through
//! its public [`Canvas`] trait: solid fills, a stroked diagonal,
//! even-odd self-intersection, gradient repeat, clip-path
//! intersection, and translucent-over-opaque compositing.

use std::f64::consts::PI;

use swraster_core::canvas::{Canvas, ShapeData, SwCanvas};
use swraster_core::color::{self, ColorSpace};
use swraster_core::compositor::image::Transform;
use swraster_core::fixed::Point;
use swraster_core::gradient::{build_table, ColorStop, LinearFill, Spread};
use swraster_core::outline::{FillRule, Outline};
use swraster_core::rle::{self, IntRect};
use swraster_core::stroke::{LineCap, LineJoin, Stroke};
use swraster_core::task::{ClipSource, Fill, UpdateFlags};

const W: u32 = 16;
const H: u32 = 16;

fn new_surface_canvas(buf: &mut [u32]) -> SwCanvas {
    let mut canvas = SwCanvas::new(1, 0);
    unsafe {
        canvas.target(buf.as_mut_ptr(), W, W, H, ColorSpace::Abgr8888).unwrap();
    }
    canvas
}

fn rect_outline(x0: i32, y0: i32, x1: i32, y1: i32) -> Outline {
    let mut o = Outline::new();
    o.move_to(Point::new(x0 * 64, y0 * 64));
    o.line_to(Point::new(x1 * 64, y0 * 64));
    o.line_to(Point::new(x1 * 64, y1 * 64));
    o.line_to(Point::new(x0 * 64, y1 * 64));
    o.close();
    o
}

fn px(buf: &[u32], x: i32, y: i32) -> u32 {
    buf[(y as u32 * W + x as u32) as usize]
}

#[test]
fn red_square_no_stroke() {
    let mut buf = vec![0u32; (W * H) as usize];
    let mut canvas = new_surface_canvas(&mut buf);

    let data = ShapeData {
        fill: Fill::Solid(color::join(ColorSpace::Abgr8888, 255, 0, 0, 255)),
        ..Default::default()
    };
    let tid = canvas.prepare_shape(rect_outline(2, 2, 10, 10), data, Transform::identity(), 255, vec![], UpdateFlags::PATH);
    canvas.pre_render();
    canvas.render_shape(tid).unwrap();
    canvas.post_render();
    canvas.sync().unwrap();

    let red = color::join(ColorSpace::Abgr8888, 255, 0, 0, 255);
    let mut painted = 0;
    for y in 0..H as i32 {
        for x in 0..W as i32 {
            let in_square = (2..10).contains(&x) && (2..10).contains(&y);
            let c = px(&buf, x, y);
            if in_square {
                assert_eq!(c, red, "pixel ({x},{y}) should be fully red");
                painted += 1;
            } else {
                assert_eq!(c, 0, "pixel ({x},{y}) should be untouched");
            }
        }
    }
    assert_eq!(painted, 64);
}

#[test]
fn black_diagonal_stroke_is_symmetric_and_bounded() {
    let mut buf = vec![0u32; (W * H) as usize];
    let mut canvas = new_surface_canvas(&mut buf);

    let mut path = Outline::new();
    path.opened = true;
    path.move_to(Point::new(0, 0));
    path.line_to(Point::new(16 * 64, 16 * 64));
    path.close();

    let data = ShapeData {
        stroke: Some(Stroke::new(2 * 64, LineCap::Butt, LineJoin::Miter).unwrap()),
        stroke_color: color::join(ColorSpace::Abgr8888, 0, 0, 0, 255),
        ..Default::default()
    };
    let tid = canvas.prepare_shape(path, data, Transform::identity(), 255, vec![], UpdateFlags::PATH | UpdateFlags::STROKE);
    canvas.pre_render();
    canvas.render_shape(tid).unwrap();
    canvas.post_render();
    canvas.sync().unwrap();

    // Near the diagonal's midpoint, the stroke should cover more than
    // half the pixel.
    assert!(color::alpha(px(&buf, 7, 8)) >= 128 || color::alpha(px(&buf, 8, 7)) >= 128);
    // Far from the line (top-right corner region), nothing is painted.
    assert_eq!(px(&buf, 0, 15), 0);
}

fn star_polygon_outline(cx: f64, cy: f64, outer_r: f64) -> Outline {
    let mut o = Outline::new();
    o.fill_rule = FillRule::EvenOdd;
    // A pentagram: connect every second vertex of a regular pentagon,
    // which self-intersects and leaves an inner pentagon double-covered.
    let angle = |k: i32| -> f64 { -PI / 2.0 + (k as f64) * (4.0 * PI / 5.0) };
    let point = |k: i32| -> Point {
        let a = angle(k);
        Point::new(
            ((cx + outer_r * a.cos()) * 64.0).round() as i32,
            ((cy + outer_r * a.sin()) * 64.0).round() as i32,
        )
    };
    o.move_to(point(0));
    for k in 1..5 {
        o.line_to(point(k));
    }
    o.close();
    o
}

#[test]
fn even_odd_star_has_transparent_core() {
    let mut buf = vec![0u32; (W * H) as usize];
    let mut canvas = new_surface_canvas(&mut buf);

    let path = star_polygon_outline(8.0, 8.0, 7.0);
    let blue = color::join(ColorSpace::Abgr8888, 0, 0, 255, 255);
    let data = ShapeData { fill: Fill::Solid(blue), ..Default::default() };
    let tid = canvas.prepare_shape(path, data, Transform::identity(), 255, vec![], UpdateFlags::PATH);
    canvas.pre_render();
    canvas.render_shape(tid).unwrap();
    canvas.post_render();
    canvas.sync().unwrap();

    // The geometric centre sits inside the pentagram's inner pentagon,
    // which even-odd parity leaves unfilled.
    assert_eq!(px(&buf, 8, 8), 0);
    // A point well out along one arm, clear of both the core and the
    // outer edge, is fully covered.
    assert_eq!(px(&buf, 8, 3), blue);
}

#[test]
fn linear_gradient_repeats_across_rect() {
    let mut buf = vec![0u32; (W * H) as usize];
    let mut canvas = new_surface_canvas(&mut buf);

    let stops = vec![
        ColorStop { offset: 0.0, r: 255, g: 0, b: 0, a: 255 },
        ColorStop { offset: 1.0, r: 0, g: 0, b: 255, a: 255 },
    ];
    let (table, _) = build_table(&stops, 255, ColorSpace::Abgr8888).unwrap();
    let fill = LinearFill { dx: 0.25, dy: 0.0, offset: 0.0, spread: Spread::Repeat };
    let data = ShapeData {
        fill: Fill::Linear { fill, stops, table: Box::new(table) },
        ..Default::default()
    };

    let tid = canvas.prepare_shape(rect_outline(0, 0, 16, 4), data, Transform::identity(), 255, vec![], UpdateFlags::PATH);
    canvas.pre_render();
    canvas.render_shape(tid).unwrap();
    canvas.post_render();
    canvas.sync().unwrap();

    // dx = 0.25 means the gradient completes one full cycle every 4
    // pixels: positions 4 apart land on the same table entry.
    assert_eq!(px(&buf, 0, 1), px(&buf, 4, 1));
    assert_eq!(px(&buf, 4, 1), px(&buf, 8, 1));
    // Pixel 3 (near the far end of one cycle) differs from pixel 0
    // (near its start).
    assert_ne!(px(&buf, 0, 1), px(&buf, 3, 1));
}

#[test]
fn clip_path_intersection_masks_corners() {
    let mut buf = vec![0u32; (W * H) as usize];
    let mut canvas = new_surface_canvas(&mut buf);

    // Circle of radius 4 centred at (4, 4), approximated as a 32-gon.
    let mut circle = Outline::new();
    const SIDES: i32 = 32;
    for k in 0..SIDES {
        let a = (k as f64) * 2.0 * PI / SIDES as f64;
        let p = Point::new(((4.0 + 4.0 * a.cos()) * 64.0).round() as i32, ((4.0 + 4.0 * a.sin()) * 64.0).round() as i32);
        if k == 0 {
            circle.move_to(p);
        } else {
            circle.line_to(p);
        }
    }
    circle.close();
    let clip_rle = rle::rasterize(&circle, IntRect { x1: 0, y1: 0, x2: W as i32, y2: H as i32 }, true);

    let data = ShapeData {
        fill: Fill::Solid(color::join(ColorSpace::Abgr8888, 255, 0, 0, 255)),
        ..Default::default()
    };
    let tid = canvas.prepare_shape(
        rect_outline(0, 0, 8, 8),
        data,
        Transform::identity(),
        255,
        vec![ClipSource::Rle(clip_rle)],
        UpdateFlags::PATH,
    );
    canvas.pre_render();
    canvas.render_shape(tid).unwrap();
    canvas.post_render();
    canvas.sync().unwrap();

    // The disk's centre is painted; shape A's far corner (outside the
    // clip circle) is not.
    assert_ne!(px(&buf, 4, 4), 0);
    assert_eq!(px(&buf, 0, 0), 0);
}

#[test]
fn translucent_over_opaque_matches_source_over() {
    let mut buf = vec![0u32; (W * H) as usize];
    let mut canvas = new_surface_canvas(&mut buf);

    let blue = color::join(ColorSpace::Abgr8888, 0, 0, 255, 255);
    let data_a = ShapeData { fill: Fill::Solid(blue), ..Default::default() };
    let tid_a = canvas.prepare_shape(rect_outline(0, 0, 8, 8), data_a, Transform::identity(), 255, vec![], UpdateFlags::PATH);
    canvas.pre_render();
    canvas.render_shape(tid_a).unwrap();
    canvas.post_render();
    canvas.sync().unwrap();

    let red_straight = color::join(ColorSpace::Abgr8888, 255, 0, 0, 128);
    let red_premul = color::premul(ColorSpace::Abgr8888, red_straight);
    let data_b = ShapeData { fill: Fill::Solid(red_premul), ..Default::default() };
    let tid_b = canvas.prepare_shape(rect_outline(4, 4, 12, 12), data_b, Transform::identity(), 255, vec![], UpdateFlags::PATH);
    canvas.pre_render();
    canvas.render_shape(tid_b).unwrap();
    canvas.post_render();
    canvas.sync().unwrap();

    let expected = swraster_core::compositor::source_over(blue, red_premul);
    assert_eq!(px(&buf, 5, 5), expected);
}
