pub mod deliverable;
pub mod trello_relation;
