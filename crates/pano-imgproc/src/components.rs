use pano_image::{ops::is_background, Image, ImageError};

use crate::parallel;

/// A disjoint-set (union-find) data structure.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    /// Creates a new UnionFind structure with `len` singleton sets.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    /// Returns the representative (root) of the set containing `id`, with path compression.
    pub fn find(&mut self, mut id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        // collapse the path
        while self.parent[id] != root {
            let next = self.parent[id];
            self.parent[id] = root;
            id = next;
        }

        root
    }

    /// Unites the sets containing `a` and `b`, returning the representative of the resulting set.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let aroot = self.find(a);
        let broot = self.find(b);

        if aroot == broot {
            return aroot;
        }

        if self.size[aroot] >= self.size[broot] {
            self.parent[broot] = aroot;
            self.size[aroot] += self.size[broot];
            aroot
        } else {
            self.parent[aroot] = broot;
            self.size[broot] += self.size[aroot];
            broot
        }
    }

    /// Number of elements tracked by the structure.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns true when the structure tracks no elements.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// An 8-connected foreground region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// Number of pixels in the region.
    pub area: usize,
    /// Left-most column.
    pub min_x: usize,
    /// Top-most row.
    pub min_y: usize,
    /// Right-most column, inclusive.
    pub max_x: usize,
    /// Bottom-most row, inclusive.
    pub max_y: usize,
}

impl Component {
    fn new(x: usize, y: usize) -> Self {
        Self {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn extend(&mut self, x: usize, y: usize) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Width of the bounding box.
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    /// Height of the bounding box.
    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    /// Area of the bounding box.
    pub fn bbox_area(&self) -> usize {
        self.width() * self.height()
    }
}

/// Binarize an image: 255 where any channel is non-zero, 0 elsewhere.
pub fn foreground_mask<T, const C: usize>(src: &Image<T, C>) -> Result<Image<u8, 1>, ImageError>
where
    T: Default + PartialEq + Clone + Send + Sync,
{
    let mut mask = Image::<u8, 1>::from_size_val(src.size(), 0)?;
    parallel::par_iter_rows(src, &mut mask, |src_pixel, dst_pixel| {
        dst_pixel[0] = if is_background(src_pixel) { 0 } else { 255 };
    });
    Ok(mask)
}

/// Label the 8-connected non-zero regions of a mask.
///
/// Components are returned in the scan order of their first pixel.
pub fn connected_components(mask: &Image<u8, 1>) -> Vec<Component> {
    let (cols, rows) = (mask.cols(), mask.rows());
    let data = mask.as_slice();
    let mut uf = UnionFind::new(data.len());

    for y in 0..rows {
        for x in 0..cols {
            let idx = y * cols + x;
            if data[idx] == 0 {
                continue;
            }

            // previously visited neighbors: W, NW, N, NE
            if x > 0 && data[idx - 1] != 0 {
                uf.union(idx, idx - 1);
            }
            if y > 0 {
                let up = idx - cols;
                if data[up] != 0 {
                    uf.union(idx, up);
                }
                if x > 0 && data[up - 1] != 0 {
                    uf.union(idx, up - 1);
                }
                if x + 1 < cols && data[up + 1] != 0 {
                    uf.union(idx, up + 1);
                }
            }
        }
    }

    let mut slot_of_root = vec![usize::MAX; data.len()];
    let mut components = Vec::new();

    for y in 0..rows {
        for x in 0..cols {
            let idx = y * cols + x;
            if data[idx] == 0 {
                continue;
            }
            let root = uf.find(idx);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = components.len();
                components.push(Component::new(x, y));
            }
            components[slot_of_root[root]].extend(x, y);
        }
    }

    components
}

/// Find the largest 8-connected non-zero region of a mask.
///
/// Ties on pixel count prefer the larger bounding box, then the region met
/// first in scan order. Returns `None` when the mask is empty.
pub fn largest_component(mask: &Image<u8, 1>) -> Option<Component> {
    connected_components(mask)
        .into_iter()
        .fold(None, |best: Option<Component>, c| match best {
            Some(b) if (c.area, c.bbox_area()) <= (b.area, b.bbox_area()) => Some(b),
            _ => Some(c),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(10);
        assert_eq!(uf.find(5), 5);

        uf.union(0, 1);
        uf.union(1, 2);
        assert_eq!(uf.find(0), uf.find(2));

        uf.union(3, 4);
        assert_ne!(uf.find(0), uf.find(3));

        uf.union(0, 3);
        assert_eq!(uf.find(2), uf.find(4));
        assert_eq!(uf.len(), 10);
    }

    #[test]
    fn test_diagonal_connectivity() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let mask = Image::<u8, 1>::new([4, 3].into(), vec![
            255, 0, 0, 0,
            0, 255, 0, 0,
            0, 0, 255, 0,
        ])?;
        let components = connected_components(&mask);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].area, 3);
        assert_eq!((components[0].width(), components[0].height()), (3, 3));
        Ok(())
    }

    #[test]
    fn test_largest_component() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let mask = Image::<u8, 1>::new([6, 3].into(), vec![
            255, 0, 0, 255, 255, 255,
            0,   0, 0, 255, 255, 0,
            255, 0, 0, 0,   0,   0,
        ])?;
        let largest = largest_component(&mask);
        assert_eq!(
            largest,
            Some(Component {
                area: 5,
                min_x: 3,
                min_y: 0,
                max_x: 5,
                max_y: 1,
            })
        );
        Ok(())
    }

    #[test]
    fn test_tie_prefers_bbox_then_scan_order() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let mask = Image::<u8, 1>::new([8, 2].into(), vec![
            255, 255, 0, 255, 0,   0, 255, 255,
            0,   0,   0, 0,   255, 0, 0,   0,
        ])?;
        // the three regions tie on area, the diagonal pair has the larger box
        let largest = largest_component(&mask).map(|c| (c.min_x, c.min_y));
        assert_eq!(largest, Some((3, 0)));

        let mask = Image::<u8, 1>::new([5, 1].into(), vec![255, 255, 0, 255, 255])?;
        let largest = largest_component(&mask).map(|c| c.min_x);
        assert_eq!(largest, Some(0));
        Ok(())
    }

    #[test]
    fn test_empty_mask() -> Result<(), ImageError> {
        let mask = Image::<u8, 1>::from_size_val([3, 3].into(), 0)?;
        assert_eq!(largest_component(&mask), None);
        Ok(())
    }

    #[test]
    fn test_foreground_mask() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::new([2, 1].into(), vec![0, 0, 0, 0, 3, 0])?;
        let mask = foreground_mask(&image)?;
        assert_eq!(mask.as_slice(), &[0, 255]);
        Ok(())
    }
}
