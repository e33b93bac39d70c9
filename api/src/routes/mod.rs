pub mod client_review_route;
