use tablemap_core::{EntityDescriptor, MemberDescriptor, Schema, SqlType, Value};
use tablemap_query::{
    BindType, CreateIntent, DeleteBuilder, DeleteIntent, Direction, KEY_PARAM, LINK_OWNERS_PARAM,
    ParamValues, Parameterized, QueryBuilder, SqlRenderer, TABLE_NAME_PARAM, UpdateIntent, field,
    param_of,
};
use tablemap_mysql::{MySqlConfig, MySqlRenderer};

fn schema() -> Schema {
    Schema::builder()
        .register_descriptor(
            EntityDescriptor::new("Country", "country")
                .member(MemberDescriptor::key("id"))
                .member(MemberDescriptor::of::<String>("name")),
        )
        .register_descriptor(
            EntityDescriptor::new("PersonLocation", "location")
                .member(MemberDescriptor::key("id"))
                .member(MemberDescriptor::of::<String>("city"))
                .member(MemberDescriptor::link("country", "Country")),
        )
        .register_descriptor(
            EntityDescriptor::new("Person", "person")
                .member(MemberDescriptor::key("id"))
                .member(MemberDescriptor::of::<String>("name"))
                .member(MemberDescriptor::link("location", "PersonLocation"))
                .member(MemberDescriptor::link("previous", "PersonLocation").nullable(true))
                .member(MemberDescriptor::many("friends", "Person")),
        )
        .register_descriptor(
            EntityDescriptor::new("Animal", "animal")
                .abstract_type()
                .member(MemberDescriptor::key("id"))
                .member(MemberDescriptor::of::<String>("name"))
                .member(MemberDescriptor::link("owner", "Person").nullable(true)),
        )
        .register_descriptor(
            EntityDescriptor::new("Cat", "cat")
                .extends("Animal")
                .member(MemberDescriptor::new("color", SqlType::VarChar(32)).nullable(true)),
        )
        .register_descriptor(
            EntityDescriptor::new("Dog", "dog")
                .extends("Animal")
                .member(MemberDescriptor::of::<bool>("trained")),
        )
        .build()
        .unwrap()
}

#[test]
fn select_projects_aliased_columns() {
    let schema = schema();
    let person = schema.id_of("Person").unwrap();
    let intent = QueryBuilder::new(&schema, person).build();
    let sql = MySqlRenderer::default().render_query(&schema, &intent);
    assert_eq!(
        sql.text(),
        "SELECT P.`id` AS \"P*id\", P.`name` AS \"P*name\", P.`location_id` AS \"P*location_id\", \
         P.`previous_id` AS \"P*previous_id\" FROM `person` P ORDER BY P.`id` ASC"
    );
}

#[test]
fn select_on_base_type_joins_subtypes() {
    let schema = schema();
    let animal = schema.id_of("Animal").unwrap();
    let intent = QueryBuilder::new(&schema, animal)
        .filter(field("trained").not())
        .unwrap()
        .build();
    let sql = MySqlRenderer::default().render_query(&schema, &intent).text();
    assert!(sql.contains("A.`__type` AS \"A*__type\""));
    assert!(sql.contains("C.`color` AS \"C*color\""));
    assert!(sql.contains("D.`trained` AS \"D*trained\""));
    assert!(sql.contains(
        "FROM `animal` A LEFT OUTER JOIN `cat` C ON C.`id` = A.`id` \
         LEFT OUTER JOIN `dog` D ON D.`id` = A.`id`"
    ));
    assert!(sql.ends_with(" WHERE NOT (D.`trained` = TRUE) ORDER BY A.`id` ASC"));
}

#[test]
fn select_on_subtype_joins_parent_and_filter_links() {
    let schema = schema();
    let cat = schema.id_of("Cat").unwrap();
    let intent = QueryBuilder::new(&schema, cat)
        .filter(field("owner.name").eq("ann"))
        .unwrap()
        .build();
    let sql = MySqlRenderer::default().render_query(&schema, &intent).text();
    assert!(sql.starts_with(
        "SELECT C.`id` AS \"C*id\", C.`color` AS \"C*color\", A.`id` AS \"A*id\""
    ));
    assert!(sql.contains(
        "FROM `cat` C INNER JOIN `animal` A ON A.`id` = C.`id` \
         LEFT OUTER JOIN `person` P ON P.`id` = A.`owner_id`"
    ));
    assert!(!sql.contains("P.`name` AS"));
    assert!(sql.ends_with(" WHERE (P.`name` = 'ann') ORDER BY C.`id` ASC"));
}

#[test]
fn required_links_can_be_inner_joins() {
    let schema = schema();
    let person = schema.id_of("Person").unwrap();
    let intent = QueryBuilder::new(&schema, person)
        .include("location.country")
        .unwrap()
        .include("previous")
        .unwrap()
        .order_by("name", Direction::Desc)
        .unwrap()
        .limit(5)
        .offset(10)
        .build();

    let outer = MySqlRenderer::default().render_query(&schema, &intent).text();
    assert!(outer.contains("LEFT OUTER JOIN `location` PL ON PL.`id` = P.`location_id`"));

    let renderer = MySqlRenderer::new(MySqlConfig::new().inner_join_required_links(true));
    let sql = renderer.render_query(&schema, &intent).text();
    assert!(sql.contains("INNER JOIN `location` PL ON PL.`id` = P.`location_id`"));
    assert!(sql.contains("INNER JOIN `country` C ON C.`id` = PL.`country_id`"));
    assert!(sql.contains("LEFT OUTER JOIN `location` PL1 ON PL1.`id` = P.`previous_id`"));
    assert!(sql.contains("PL1.`city` AS \"PL1*city\""));
    assert!(sql.ends_with(" ORDER BY P.`name` DESC LIMIT 5 OFFSET 10"));
}

#[test]
fn offset_without_limit() {
    let schema = schema();
    let person = schema.id_of("Person").unwrap();
    let intent = QueryBuilder::new(&schema, person).offset(3).build();
    let sql = MySqlRenderer::default().render_query(&schema, &intent).text();
    assert!(sql.ends_with(" ORDER BY P.`id` ASC LIMIT 18446744073709551615 OFFSET 3"));
}

#[test]
fn parameters_bind_to_question_marks() {
    let schema = schema();
    let person = schema.id_of("Person").unwrap();
    let mut intent = QueryBuilder::new(&schema, person)
        .filter_with_parameters(field("name").starts_with(param_of("prefix", BindType::Text)))
        .unwrap()
        .build();
    intent.set_variable("prefix", "an").unwrap();

    let renderer = MySqlRenderer::default();
    let sql = renderer.render_query(&schema, &intent);
    assert!(sql.text().ends_with(
        r" WHERE (P.`name` LIKE CONCAT(REPLACE(REPLACE(REPLACE(@prefix, '\\', '\\\\'), '%', '\\%'), '_', '\\_'), '%')) ORDER BY P.`id` ASC"
    ));

    let bound = renderer.bind(&sql, &intent.param_values().unwrap()).unwrap();
    assert!(bound.sql.ends_with(
        r" WHERE (P.`name` LIKE CONCAT(REPLACE(REPLACE(REPLACE(?, '\\', '\\\\'), '%', '\\%'), '_', '\\_'), '%')) ORDER BY P.`id` ASC"
    ));
    assert_eq!(bound.params, vec![Value::Text("an".to_string())]);
}

#[test]
fn insert_writes_every_table_of_the_chain() {
    let schema = schema();
    let cat = schema.id_of("Cat").unwrap();
    let intent = CreateIntent::build(&schema, cat).unwrap();
    let rendered = MySqlRenderer::default().render_create(&schema, &intent);

    assert_eq!(rendered.inserts.len(), 2);
    assert_eq!(
        rendered.inserts[0].text(),
        "INSERT INTO `animal` (`name`, `owner_id`, `__type`) \
         VALUES (@animal_name, @animal_owner_id, @animal___type); \
         SELECT LAST_INSERT_ID() AS `id`"
    );
    assert_eq!(
        rendered.inserts[1].text(),
        "INSERT INTO `cat` (`id`, `color`) VALUES (@cat_id, @cat_color)"
    );
    assert!(rendered.links.is_empty());
}

#[test]
fn insert_link_rows() {
    let schema = schema();
    let person = schema.id_of("Person").unwrap();
    let intent = CreateIntent::build(&schema, person).unwrap();
    let rendered = MySqlRenderer::default().render_create(&schema, &intent);
    assert_eq!(
        rendered.links[0].text(),
        "INSERT INTO `person_friends` (`person_id`, `person_ref_id`) VALUES (@owner, @target)"
    );
}

#[test]
fn update_by_key_spans_the_chain() {
    let schema = schema();
    let cat = schema.id_of("Cat").unwrap();
    let intent = UpdateIntent::by_primary_key(&schema, cat).unwrap();
    let rendered = MySqlRenderer::default().render_update(&schema, &intent);

    assert_eq!(
        rendered.update.text(),
        "UPDATE `cat` C INNER JOIN `animal` A ON A.`id` = C.`id` \
         SET A.`name` = @set_A_name, A.`owner_id` = @set_A_owner_id, C.`color` = @set_C_color \
         WHERE (C.`id` = @key)"
    );
    assert_eq!(
        rendered.select.text(),
        "SELECT DISTINCT C.`id` AS \"C*id\" FROM `cat` C \
         INNER JOIN `animal` A ON A.`id` = C.`id` WHERE (C.`id` = @key)"
    );
}

#[test]
fn delete_names_only_the_hierarchy_root() {
    let schema = schema();
    let animal = schema.id_of("Animal").unwrap();
    let intent = DeleteBuilder::new(&schema, animal)
        .filter(field("name").eq("felix"))
        .unwrap()
        .build();
    let sql = MySqlRenderer::default().render_delete(&schema, &intent).text();
    assert_eq!(
        sql,
        "DELETE A FROM `animal` A LEFT OUTER JOIN `cat` C ON C.`id` = A.`id` \
         LEFT OUTER JOIN `dog` D ON D.`id` = A.`id` WHERE (A.`name` = 'felix')"
    );

    let cat = schema.id_of("Cat").unwrap();
    let mut by_key = DeleteIntent::by_primary_key(&schema, cat).unwrap();
    by_key.set_variable(KEY_PARAM, 7_i64).unwrap();
    let renderer = MySqlRenderer::default();
    let sql = renderer.render_delete(&schema, &by_key);
    let bound = renderer.bind(&sql, &by_key.param_values().unwrap()).unwrap();
    assert!(bound.sql.starts_with("DELETE A FROM `cat` C INNER JOIN `animal` A ON A.`id` = C.`id`"));
    assert_eq!(bound.params, vec![Value::BigInt(7)]);
}

#[test]
fn link_table_statements() {
    let schema = schema();
    let link = &schema.link_tables()[0];
    let renderer = MySqlRenderer::default();

    let select = renderer.render_link_select(link);
    assert_eq!(
        select.text(),
        "SELECT `person_id` AS `owner`, `person_ref_id` AS `target` FROM `person_friends` \
         WHERE `person_id` IN @owners"
    );
    let mut values = ParamValues::new();
    values.insert(
        LINK_OWNERS_PARAM.to_string(),
        Value::Array(vec![Value::BigInt(1), Value::BigInt(2)]),
    );
    let bound = renderer.bind(&select, &values).unwrap();
    assert!(bound.sql.ends_with("IN (?, ?)"));

    assert_eq!(
        renderer.render_link_delete(link).text(),
        "DELETE FROM `person_friends` WHERE `person_id` = @owner"
    );
}

#[test]
fn table_exists_check() {
    let default = MySqlRenderer::default().render_table_exists().text();
    assert!(default.contains("table_schema = DATABASE()"));
    assert!(default.ends_with(&format!("table_name = @{TABLE_NAME_PARAM}")));

    let zoo = MySqlRenderer::new(MySqlConfig::new().database("zoo"))
        .render_table_exists()
        .text();
    assert!(zoo.contains("table_schema = 'zoo'"));
}

#[test]
fn create_table_delegates_to_ddl() {
    let schema = schema();
    let dog = schema.id_of("Dog").unwrap();
    let stmts = MySqlRenderer::default().render_create_table(&schema, dog);
    assert!(stmts[0].contains("`trained` TINYINT(1) NOT NULL"));
    assert!(stmts[0].contains("REFERENCES `animal` (`id`) ON DELETE CASCADE"));
}
