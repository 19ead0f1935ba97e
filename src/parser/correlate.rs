use std::ops::Range;

/// A piece of text and where it sits vertically on the rendered page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placed<'a> {
    pub text: &'a str,
    pub y: f64,
}

impl<'a> Placed<'a> {
    pub fn new(text: &'a str, y: f64) -> Self {
        Self { text, y }
    }
}

/// Group `values` under `labels` by screen position.
///
/// Label `i` takes values in order while each sits above label `i + 1`; the
/// last label takes everything left. Returns one range into `values` per label.
/// Both inputs must be in document order. Labels whose positions collide or
/// run backwards are not detected: values then shift to a later label.
pub fn correlate(labels: &[Placed<'_>], values: &[Placed<'_>]) -> Vec<Range<usize>> {
    let mut cursor = 0;
    let mut groups = Vec::with_capacity(labels.len());

    for i in 0..labels.len() {
        let start = cursor;
        match labels.get(i + 1) {
            Some(next) => {
                while cursor < values.len() && values[cursor].y < next.y {
                    cursor += 1;
                }
            }
            None => cursor = values.len(),
        }
        groups.push(start..cursor);
    }

    groups
}
