/// Even distribution of `hits` over `length` steps: hit `i` lands on
/// `floor(i * length / hits)`. The result is then rotated left by `shift`.
pub fn euclidean(length: usize, hits: usize, shift: usize) -> Vec<bool> {
    if length == 0 {
        return Vec::new();
    }
    if hits == 0 {
        return vec![false; length];
    }
    if hits >= length {
        return vec![true; length];
    }

    let mut pattern = vec![false; length];
    for i in 0..hits {
        pattern[i * length / hits] = true;
    }
    pattern.rotate_left(shift % length);
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(p: &[bool]) -> String {
        p.iter().map(|&b| if b { 'x' } else { '.' }).collect()
    }

    #[test]
    fn euclid_basic() {
        assert_eq!(render(&euclidean(16, 4, 0)), "x...x...x...x...");
        assert_eq!(render(&euclidean(8, 3, 0)), "x.x..x..");
        assert_eq!(render(&euclidean(8, 5, 0)), "xx.xx.x.");
    }

    #[test]
    fn euclid_edge_cases() {
        assert_eq!(render(&euclidean(8, 0, 0)), "........");
        assert_eq!(render(&euclidean(8, 8, 3)), "xxxxxxxx");
        assert!(euclidean(0, 4, 0).is_empty());
    }

    #[test]
    fn shift_rotates_cyclically() {
        let base = euclidean(8, 3, 0);
        let shifted = euclidean(8, 3, 2);
        assert_eq!(render(&shifted), "x..x..x.");
        for i in 0..8 {
            assert_eq!(shifted[i], base[(i + 2) % 8]);
        }
        assert_eq!(euclidean(8, 3, 10), shifted);
    }
}
