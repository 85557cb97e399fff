use std::ops::{Index, IndexMut};

use arbitrary::Arbitrary;

/// A five-letter alphabet keeps the generated keywords short and colliding,
/// which is where the interesting fuzzy matches live.
#[derive(Debug, Clone, Copy, Arbitrary)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
}

impl Letter {
    pub fn to_char(self) -> char {
        match self {
            Letter::A => 'a',
            Letter::B => 'b',
            Letter::C => 'c',
            Letter::D => 'd',
            Letter::E => 'e',
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
pub struct Keyword(pub Vec<Letter>);

impl Keyword {
    pub fn to_s(&self) -> String {
        self.0.iter().map(|letter| letter.to_char()).collect()
    }
}

#[derive(Debug, Clone, Copy, Arbitrary)]
pub enum Threshold {
    Zero,
    One,
    Two,
    Three,
}

impl Threshold {
    pub fn to_u8(self) -> u8 {
        match self {
            Threshold::Zero => 0,
            Threshold::One => 1,
            Threshold::Two => 2,
            Threshold::Three => 3,
        }
    }
}

#[derive(Debug, Arbitrary)]
pub struct Workload {
    pub keywords: Vec<Keyword>,
    pub queries: Vec<Keyword>,
    pub threshold: Threshold,
    pub transpositions: bool,
}

// A simple wrapper around vec so we can get contiguous but index it like
// it's a 2D array.
struct N2Array<T> {
    y_size: usize,
    buf: Vec<T>,
}

impl<T: Clone> N2Array<T> {
    fn new(x: usize, y: usize, value: T) -> N2Array<T> {
        N2Array { y_size: y, buf: vec![value; x * y] }
    }
}

impl<T> Index<(usize, usize)> for N2Array<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        &self.buf[(x * self.y_size) + y]
    }
}

impl<T> IndexMut<(usize, usize)> for N2Array<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        &mut self.buf[(x * self.y_size) + y]
    }
}

/// The whole-string edit distance between `source` and `target`, counting an
/// adjacent swap as one operation when `transpositions` is set.
///
/// This is the reference the fuzzer holds the engine against: a cost the
/// engine stores is the cost of one concrete edit script, so the optimum
/// computed here can never exceed it.
pub fn edit_distance(source: &str, target: &str, transpositions: bool) -> u32 {
    let source: Vec<char> = source.chars().collect();
    let target: Vec<char> = target.chars().collect();
    let (n, m) = (source.len(), target.len());

    let mut matrix = N2Array::new(n + 1, m + 1, 0u32);
    for i in 0..=n {
        matrix[(i, 0)] = i as u32;
    }
    for j in 0..=m {
        matrix[(0, j)] = j as u32;
    }

    for i in 1..=n {
        for j in 1..=m {
            let cost = if source[i - 1] == target[j - 1] { 0 } else { 1 };
            let mut dist = (matrix[(i - 1, j)] + 1)
                .min(matrix[(i, j - 1)] + 1)
                .min(matrix[(i - 1, j - 1)] + cost);
            if transpositions
                && i > 1
                && j > 1
                && source[i - 1] == target[j - 2]
                && source[i - 2] == target[j - 1]
            {
                dist = dist.min(matrix[(i - 2, j - 2)] + 1);
            }
            matrix[(i, j)] = dist;
        }
    }

    matrix[(n, m)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_distances() {
        assert_eq!(edit_distance("form", "form", false), 0);
        assert_eq!(edit_distance("farm", "form", false), 1);
        assert_eq!(edit_distance("frm", "form", false), 1);
        assert_eq!(edit_distance("", "form", false), 4);
    }

    #[test]
    fn transposition_counts_as_one() {
        assert_eq!(edit_distance("fro", "for", false), 2);
        assert_eq!(edit_distance("fro", "for", true), 1);
        assert_eq!(edit_distance("fomr", "form", true), 1);
    }
}
