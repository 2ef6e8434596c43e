//! Binary change maps and their external contours

use super::BoundingBox;
use image::GrayImage;

/// Clockwise neighbour offsets in image coordinates (y grows downward), starting east
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const WEST: usize = 4;

/// Changed / unchanged pixel map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl BinaryMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            None
        } else {
            Some(y as usize * self.width as usize + x as usize)
        }
    }

    /// Out-of-bounds pixels read as unset
    pub fn get(&self, x: i32, y: i32) -> bool {
        self.offset(x, y).map(|i| self.data[i]).unwrap_or(false)
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if let Some(i) = self.offset(x as i32, y as i32) {
            self.data[i] = value;
        }
    }

    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }
}

/// Pixels whose absolute difference exceeds `threshold`
pub fn threshold_difference(reference: &GrayImage, current: &GrayImage, threshold: u8) -> BinaryMask {
    let (w, h) = reference.dimensions();
    let data = reference
        .as_raw()
        .iter()
        .zip(current.as_raw().iter())
        .map(|(a, b)| a.abs_diff(*b) > threshold)
        .collect();

    BinaryMask {
        width: w,
        height: h,
        data,
    }
}

/// Dilate with a 3x3 square structuring element, `iterations` times
pub fn dilate(mask: &BinaryMask, iterations: usize) -> BinaryMask {
    let mut current = mask.clone();

    for _ in 0..iterations {
        let mut next = BinaryMask::new(current.width, current.height);
        for y in 0..current.height as i32 {
            for x in 0..current.width as i32 {
                let hit = (-1..=1).any(|dy| (-1..=1).any(|dx| current.get(x + dx, y + dy)));
                if hit {
                    next.set(x as u32, y as u32, true);
                }
            }
        }
        current = next;
    }

    current
}

/// Outer boundary of one connected region
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
    pub bounding_box: BoundingBox,
}

impl Contour {
    /// Polygon area enclosed by the boundary points (shoelace formula)
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }

        let twice_area: i64 = (0..n)
            .map(|i| {
                let (x0, y0) = self.points[i];
                let (x1, y1) = self.points[(i + 1) % n];
                x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
            })
            .sum();

        twice_area.abs() as f64 / 2.0
    }
}

/// External contours of the 8-connected regions in `mask`, in raster order of
/// each region's first pixel. Regions enclosed by a hole of another region are
/// not external and are left out.
pub fn external_contours(mask: &BinaryMask) -> Vec<Contour> {
    let (w, h) = (mask.width as i32, mask.height as i32);
    let outside = outside_background(mask);
    let mut labels = vec![0u32; mask.data.len()];
    let mut next_label = 0u32;
    let mut contours = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let start = (y * w + x) as usize;
            if !mask.data[start] || labels[start] != 0 {
                continue;
            }

            next_label += 1;
            let region = label_region(mask, &mut labels, (x, y), next_label);

            let touches_outside = region.pixels.iter().any(|&(px, py)| {
                px == 0
                    || py == 0
                    || px == w - 1
                    || py == h - 1
                    || [(1, 0), (-1, 0), (0, 1), (0, -1)].iter().any(|(dx, dy)| {
                        mask.offset(px + dx, py + dy)
                            .map(|i| outside[i])
                            .unwrap_or(false)
                    })
            });

            if !touches_outside {
                continue;
            }

            let points = trace_boundary(mask, (x, y), region.pixels.len());
            contours.push(Contour {
                points,
                bounding_box: region.bounding_box,
            });
        }
    }

    contours
}

struct Region {
    pixels: Vec<(i32, i32)>,
    bounding_box: BoundingBox,
}

/// Flood-fill one 8-connected region starting at `seed`
fn label_region(mask: &BinaryMask, labels: &mut [u32], seed: (i32, i32), label: u32) -> Region {
    let mut stack = vec![seed];
    let mut pixels = Vec::new();
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed.0, seed.1, seed.0, seed.1);

    if let Some(i) = mask.offset(seed.0, seed.1) {
        labels[i] = label;
    }

    while let Some((x, y)) = stack.pop() {
        pixels.push((x, y));
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);

        for (dx, dy) in DIRECTIONS {
            let (nx, ny) = (x + dx, y + dy);
            if let Some(i) = mask.offset(nx, ny) {
                if mask.data[i] && labels[i] == 0 {
                    labels[i] = label;
                    stack.push((nx, ny));
                }
            }
        }
    }

    Region {
        pixels,
        bounding_box: BoundingBox {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        },
    }
}

/// Unset pixels 4-connected to the image border
fn outside_background(mask: &BinaryMask) -> Vec<bool> {
    let (w, h) = (mask.width as i32, mask.height as i32);
    let mut outside = vec![false; mask.data.len()];
    let mut stack = Vec::new();

    let seed = |x: i32, y: i32, outside: &mut Vec<bool>, stack: &mut Vec<(i32, i32)>| {
        if let Some(i) = mask.offset(x, y) {
            if !mask.data[i] && !outside[i] {
                outside[i] = true;
                stack.push((x, y));
            }
        }
    };

    for x in 0..w {
        seed(x, 0, &mut outside, &mut stack);
        seed(x, h - 1, &mut outside, &mut stack);
    }
    for y in 0..h {
        seed(0, y, &mut outside, &mut stack);
        seed(w - 1, y, &mut outside, &mut stack);
    }

    while let Some((x, y)) = stack.pop() {
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            seed(x + dx, y + dy, &mut outside, &mut stack);
        }
    }

    outside
}

/// First set neighbour found sweeping clockwise from the direction after `back`
fn sweep(mask: &BinaryMask, (x, y): (i32, i32), back: usize) -> Option<usize> {
    (1..=8)
        .map(|k| (back + k) % 8)
        .find(|&d| mask.get(x + DIRECTIONS[d].0, y + DIRECTIONS[d].1))
}

/// Moore-neighbour trace of the outer boundary, starting at the region's
/// top-left pixel and moving clockwise
fn trace_boundary(mask: &BinaryMask, start: (i32, i32), region_size: usize) -> Vec<(i32, i32)> {
    let mut points = vec![start];

    let Some(first) = sweep(mask, start, WEST) else {
        return points;
    };

    let mut current = start;
    let mut direction = first;

    for _ in 0..(region_size * 8 + 8) {
        current = (
            current.0 + DIRECTIONS[direction].0,
            current.1 + DIRECTIONS[direction].1,
        );

        let Some(next) = sweep(mask, current, (direction + 4) % 8) else {
            break;
        };

        if current == start && next == first {
            break;
        }

        points.push(current);
        direction = next;
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_from_rows(rows: &[&str]) -> BinaryMask {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut mask = BinaryMask::new(width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                mask.set(x as u32, y as u32, c == '#');
            }
        }
        mask
    }

    fn filled_rect(width: u32, height: u32, x0: u32, y0: u32, w: u32, h: u32) -> BinaryMask {
        let mut mask = BinaryMask::new(width, height);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn test_threshold_is_strictly_greater() {
        let reference = GrayImage::from_pixel(4, 1, Luma([100]));
        let mut current = reference.clone();
        current.put_pixel(0, 0, Luma([125]));
        current.put_pixel(1, 0, Luma([126]));
        current.put_pixel(2, 0, Luma([74]));

        let mask = threshold_difference(&reference, &current, 25);
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 0));
        assert!(mask.get(2, 0));
        assert!(!mask.get(3, 0));
    }

    #[test]
    fn test_dilation_grows_by_iterations() {
        let mut mask = BinaryMask::new(11, 11);
        mask.set(5, 5, true);

        assert_eq!(dilate(&mask, 1).count_set(), 9);
        let twice = dilate(&mask, 2);
        assert_eq!(twice.count_set(), 25);
        assert!(twice.get(3, 3) && twice.get(7, 7));
        assert!(!twice.get(2, 5));
    }

    #[test]
    fn test_rectangle_contour() {
        let mask = filled_rect(20, 20, 3, 4, 6, 5);
        let contours = external_contours(&mask);

        assert_eq!(contours.len(), 1);
        assert_eq!(
            contours[0].bounding_box,
            BoundingBox { x: 3, y: 4, width: 6, height: 5 }
        );
        assert_eq!(contours[0].area(), 20.0);
    }

    #[test]
    fn test_degenerate_contours_have_zero_area() {
        let mask = mask_from_rows(&[
            ".....",
            ".#...",
            ".....",
            ".###.",
            ".....",
        ]);
        let contours = external_contours(&mask);

        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].bounding_box, BoundingBox { x: 1, y: 1, width: 1, height: 1 });
        assert_eq!(contours[1].bounding_box, BoundingBox { x: 1, y: 3, width: 3, height: 1 });
        assert!(contours.iter().all(|c| c.area() == 0.0));
    }

    #[test]
    fn test_diagonal_pixels_are_one_region() {
        let mask = mask_from_rows(&[
            "#...",
            ".#..",
            "..#.",
        ]);
        let contours = external_contours(&mask);

        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_box, BoundingBox { x: 0, y: 0, width: 3, height: 3 });
    }

    #[test]
    fn test_region_inside_a_hole_is_not_external() {
        let mask = mask_from_rows(&[
            ".........",
            ".#######.",
            ".#.....#.",
            ".#..#..#.",
            ".#.....#.",
            ".#######.",
            ".........",
        ]);
        let contours = external_contours(&mask);

        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_box, BoundingBox { x: 1, y: 1, width: 7, height: 5 });
        assert_eq!(contours[0].area(), 24.0);
    }

    #[test]
    fn test_contours_in_raster_discovery_order() {
        let mut mask = filled_rect(30, 30, 20, 2, 4, 4);
        for y in 10..14 {
            for x in 1..5 {
                mask.set(x, y, true);
            }
        }

        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].bounding_box.x, 20);
        assert_eq!(contours[1].bounding_box.x, 1);
    }

    #[test]
    fn test_region_touching_the_border() {
        let mask = filled_rect(10, 10, 0, 0, 10, 3);
        let contours = external_contours(&mask);

        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_box, BoundingBox { x: 0, y: 0, width: 10, height: 3 });
        assert_eq!(contours[0].area(), 18.0);
    }
}
