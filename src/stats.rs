use std::fmt;
use std::ops::AddAssign;

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub num_polygons: usize,
    pub num_relations: usize,
    pub num_ways: usize,
    pub num_nodes: usize,
    pub num_geometry_errors: usize,
}

impl AddAssign for Stats {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.num_polygons += other.num_polygons;
        self.num_relations += other.num_relations;
        self.num_ways += other.num_ways;
        self.num_nodes += other.num_nodes;
        self.num_geometry_errors += other.num_geometry_errors;
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            r#"Written:
  polygons:     {}
  relations:    {}
  ways:         {}
  nodes:        {}
Geometry errors: {}"#,
            self.num_polygons,
            self.num_relations,
            self.num_ways,
            self.num_nodes,
            self.num_geometry_errors
        )
    }
}
