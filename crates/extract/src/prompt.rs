/// Separates triples in the completion text.
pub const TRIPLE_DELIMITER: &str = "<|>";

/// Few-shot prompt asking the model for `(subject, predicate, object)` triples
/// joined by [`TRIPLE_DELIMITER`].
pub fn build_extraction_prompt(text: &str) -> String {
    let d = TRIPLE_DELIMITER;
    format!(
        r#"You are a networked intelligence helping a human track knowledge triples about all relevant people, things, concepts, etc. and integrating them with your knowledge stored within your weights as well as that stored in a knowledge graph. Extract all of the knowledge triples from the text. A knowledge triple is a clause that contains a subject, a predicate, and an object. The subject is the entity being described, the predicate is the property of the subject that is being described, and the object is the value of the property.

EXAMPLE
It's a state in the US. It's also the number 1 producer of gold in the US.

Output: (Nevada, is a, state){d}(Nevada, is in, US){d}(Nevada, is the number 1 producer of, gold)
END OF EXAMPLE

EXAMPLE
I'm going to the store.

Output: NONE
END OF EXAMPLE

EXAMPLE
Oh huh. I know Descartes likes to drive antique scooters and play the mandolin.
Output: (Descartes, likes to drive, antique scooters){d}(Descartes, plays, mandolin)
END OF EXAMPLE

EXAMPLE
{text}Output:"#
    )
}
