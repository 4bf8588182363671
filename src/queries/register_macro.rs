macro_rules! register_queries {
    (
        $(
            $module:ident => $query_type:ident
        ),* $(,)?
    ) => {
        // Import all query modules
        $(
            pub mod $module;
            pub use $module::$query_type;
        )*

        // Generate the enum with all query types
        #[derive(Clone)]
        pub enum QueryType {
            $(
                $query_type($query_type),
            )*
        }

        // Implement Query trait for QueryType enum
        impl Query<SqlClient> for QueryType {
            fn name(&self) -> &'static str {
                match self {
                    $(
                        QueryType::$query_type(q) => Query::<SqlClient>::name(q),
                    )*
                }
            }

            fn enabled_by_default(&self) -> bool {
                match self {
                    $(
                        QueryType::$query_type(q) => Query::<SqlClient>::enabled_by_default(q),
                    )*
                }
            }

            fn supports(&self, kind: EndpointKind) -> bool {
                match self {
                    $(
                        QueryType::$query_type(q) => Query::<SqlClient>::supports(q, kind),
                    )*
                }
            }

            fn aggregation(&self) -> Aggregation {
                match self {
                    $(
                        QueryType::$query_type(q) => Query::<SqlClient>::aggregation(q),
                    )*
                }
            }

            fn fetch<'a>(
                &'a self,
                conn: &'a mut SqlClient,
                scope: &'a DatabaseScope,
            ) -> BoxFuture<'a, Result<Vec<Row>>> {
                match self {
                    $(
                        QueryType::$query_type(q) => q.fetch(conn, scope),
                    )*
                }
            }
        }

        // Generate the factory function map
        pub fn all_factories() -> HashMap<&'static str, fn() -> QueryType> {
            let mut map: HashMap<&'static str, fn() -> QueryType> = HashMap::new();
            $(
                map.insert(
                    stringify!($module),
                    || QueryType::$query_type($query_type::new()),
                );
            )*
            map
        }

        // Query names in execution order - also drives the clap flags
        pub const QUERY_NAMES: &[&'static str] = &[
            $(stringify!($module),)*
        ];
    };
}
