use super::lingual::alignment_tokens;
use super::pdf::{PdfImage, PdfWordLayer};
use super::{BoundingBox, Figure, Phrase};

/// How far ahead of the cursor a phrase token may match in the PDF token stream.
const LOOKAHEAD: usize = 64;

/// Walks phrases in document order and matches their alphanumeric tokens
/// against the PDF word stream with a forward-only cursor. A phrase gets the
/// union box of its matched words on the page of its first match.
pub(super) fn align_phrases(phrases: &mut [Phrase], layer: &PdfWordLayer) -> usize {
    let stream: Vec<(String, BoundingBox)> = layer
        .words
        .iter()
        .flat_map(|word| {
            let word_box = BoundingBox {
                page: word.page,
                top: word.top,
                left: word.left,
                bottom: word.bottom,
                right: word.right,
            };
            alignment_tokens(&word.text)
                .into_iter()
                .map(move |token| (token, word_box))
        })
        .collect();

    let mut cursor = 0;
    let mut aligned = 0;

    for phrase in phrases.iter_mut() {
        let mut bbox: Option<BoundingBox> = None;

        for token in alignment_tokens(&phrase.text) {
            let window_end = (cursor + LOOKAHEAD).min(stream.len());
            let Some(offset) = stream[cursor..window_end]
                .iter()
                .position(|(candidate, _)| *candidate == token)
            else {
                continue;
            };

            let word_box = stream[cursor + offset].1;
            cursor += offset + 1;

            bbox = match bbox {
                None => Some(word_box),
                Some(current) if current.page == word_box.page => Some(current.union(word_box)),
                Some(current) => Some(current),
            };
        }

        phrase.bbox = bbox;
        if bbox.is_some() {
            aligned += 1;
        }
    }

    aligned
}

/// Pairs figures with listed PDF images in order of appearance.
pub(super) fn align_figures(figures: &mut [Figure], images: &[PdfImage]) {
    for (figure, image) in figures.iter_mut().zip(images) {
        figure.page = Some(image.page);
        figure.width = Some(image.width);
        figure.height = Some(image.height);
    }
}
